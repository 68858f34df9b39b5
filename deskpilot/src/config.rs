//! Durable key/value configuration document
//!
//! The store owns a nested JSON document built from a defaults document with
//! the persisted file deep-merged on top. Every `set` writes the whole document
//! back to disk before returning, through a temp file and an atomic rename.

use crate::errors::AutomationError;
use crate::types::Point;
use crate::workflow::FailurePolicy;
use serde_json::{json, Map, Value};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, instrument, warn};

pub const DEFAULT_CONFIG_FILE: &str = "config.json";
pub const SCREENSHOTS_DIR: &str = "screenshots";

pub const KEY_WORK_FOLDER: &str = "work_folder";
pub const KEY_FILE_EXTENSION: &str = "file_extension";
pub const KEY_WINDOW_TITLE: &str = "window_title";
pub const KEY_CANCEL_KEY: &str = "cancel_key";
pub const KEY_FAILURE_POLICY: &str = "failure_policy";
pub const KEY_BUTTONS: &str = "buttons";
pub const KEY_CLICK_LOCATIONS: &str = "click_locations";
pub const KEY_LAST_PROCESSED_INDEX: &str = "last_processed_index";

/// The defaults every persisted document is merged onto
pub fn default_document() -> Value {
    json!({
        "work_folder": "laser",
        "file_extension": "dwg",
        "window_title": "TruTops",
        "import_delay": 3.0,
        "save_delay": 2.0,
        "select_delay": 0.3,
        "click_delay": 1.0,
        "cancel_key": "esc",
        "failure_policy": "fail_fast",
        "buttons": {
            "save_to_geo": {
                "image": "screenshots/save_to_geo.png",
                "fallback_coords": null
            },
            "ok": {
                "image": "screenshots/ok.png",
                "fallback_coords": null
            }
        },
        "click_locations": {},
        "last_processed_index": 0
    })
}

/// Deep structural union of `defaults` and `persisted`.
///
/// For every key in `persisted`: when both sides hold objects they are merged
/// recursively, otherwise the persisted value replaces the default wholesale.
/// Keys only present in `defaults` are kept, keys only present in `persisted`
/// are carried over verbatim.
pub fn merge(defaults: &Value, persisted: &Value) -> Value {
    let mut merged = defaults.clone();
    merge_into(&mut merged, persisted);
    merged
}

fn merge_into(base: &mut Value, update: &Value) {
    match (base, update) {
        (Value::Object(base_map), Value::Object(update_map)) => {
            for (key, value) in update_map {
                let both_objects =
                    value.is_object() && base_map.get(key).is_some_and(Value::is_object);
                match base_map.get_mut(key) {
                    Some(existing) if both_objects => merge_into(existing, value),
                    _ => {
                        base_map.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (base, update) => *base = update.clone(),
    }
}

/// A named on-screen target: an optional template image and an optional
/// saved coordinate to fall back on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementLocation {
    pub name: String,
    pub image: Option<PathBuf>,
    pub fallback: Option<Point>,
}

impl ElementLocation {
    /// Neither an image reference nor a fallback coordinate is configured
    pub fn is_unresolved(&self) -> bool {
        self.image.is_none() && self.fallback.is_none()
    }

    /// The image reference is configured and the file exists on disk
    pub fn has_image_file(&self) -> bool {
        self.image.as_deref().is_some_and(Path::exists)
    }
}

/// Single writer of the on-disk configuration document
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
    defaults: Value,
    data: Value,
}

impl ConfigStore {
    /// Open the store at `path` with the built-in defaults and load it
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self::with_defaults(path, default_document())
    }

    /// Open the store at `path` with custom defaults and load it
    pub fn with_defaults(path: impl Into<PathBuf>, defaults: Value) -> Self {
        let mut store = Self {
            path: path.into(),
            data: defaults.clone(),
            defaults,
        };
        store.load();
        store
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The merged document as currently held in memory
    pub fn document(&self) -> &Value {
        &self.data
    }

    /// Re-read the persisted document. A missing, unreadable or malformed file
    /// leaves the store holding the defaults only.
    #[instrument(level = "debug", skip(self), fields(path = %self.path.display()))]
    pub fn load(&mut self) {
        self.data = self.defaults.clone();

        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No persisted config, using defaults");
                return;
            }
            Err(e) => {
                warn!("Could not read config, using defaults: {}", e);
                return;
            }
        };

        match serde_json::from_str::<Value>(&text) {
            Ok(persisted @ Value::Object(_)) => {
                self.data = merge(&self.defaults, &persisted);
                debug!("Loaded persisted config");
            }
            Ok(_) => warn!("Persisted config is not a JSON object, using defaults"),
            Err(e) => warn!("Persisted config is malformed, using defaults: {}", e),
        }
    }

    /// Walk the document by successive keys. Returns `None` when a segment is
    /// missing, when an intermediate value is not an object, or when the leaf
    /// is `null`.
    pub fn get(&self, path: &[&str]) -> Option<&Value> {
        let mut current = &self.data;
        for key in path {
            current = current.as_object()?.get(*key)?;
        }
        if current.is_null() {
            None
        } else {
            Some(current)
        }
    }

    /// Replace the value at `path`, creating intermediate objects as needed,
    /// then persist the whole document. The in-memory document only changes
    /// once the write has succeeded.
    #[instrument(level = "debug", skip(self, value))]
    pub fn set(&mut self, path: &[&str], value: Value) -> Result<(), AutomationError> {
        let (leaf, parents) = path.split_last().ok_or_else(|| {
            AutomationError::InvalidArgument("config path must not be empty".to_string())
        })?;

        let mut updated = self.data.clone();
        let mut target = &mut updated;
        for key in parents {
            target = ensure_object(target)
                .entry(key.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
        }
        ensure_object(target).insert(leaf.to_string(), value);

        write_document(&self.path, &updated)?;
        self.data = updated;
        Ok(())
    }

    /// A delay stored in seconds. Missing, negative or non-numeric values
    /// yield `default_secs`.
    pub fn delay(&self, key: &str, default_secs: f64) -> Duration {
        let secs = self
            .get(&[key])
            .and_then(Value::as_f64)
            .filter(|secs| secs.is_finite() && *secs >= 0.0)
            .unwrap_or(default_secs);
        Duration::from_secs_f64(secs)
    }

    pub fn last_processed_index(&self) -> usize {
        self.get(&[KEY_LAST_PROCESSED_INDEX])
            .and_then(Value::as_u64)
            .and_then(|index| usize::try_from(index).ok())
            .unwrap_or(0)
    }

    pub fn set_last_processed_index(&mut self, index: usize) -> Result<(), AutomationError> {
        self.set(&[KEY_LAST_PROCESSED_INDEX], json!(index))
    }

    /// The image/fallback pair stored under `buttons.<name>`
    pub fn element_location(&self, name: &str) -> ElementLocation {
        let image = self
            .get(&[KEY_BUTTONS, name, "image"])
            .and_then(Value::as_str)
            .filter(|path| !path.is_empty())
            .map(PathBuf::from);
        let fallback = self
            .get(&[KEY_BUTTONS, name, "fallback_coords"])
            .and_then(Point::from_json);

        ElementLocation {
            name: name.to_string(),
            image,
            fallback,
        }
    }

    /// Record a captured template image and the click that produced it
    pub fn set_element_location(
        &mut self,
        name: &str,
        image: &Path,
        fallback: Point,
    ) -> Result<(), AutomationError> {
        self.set(
            &[KEY_BUTTONS, name, "image"],
            Value::String(image.to_string_lossy().into_owned()),
        )?;
        self.set(&[KEY_BUTTONS, name, "fallback_coords"], fallback.to_json())
    }

    /// Names of every entry under `buttons`, in document order
    pub fn button_names(&self) -> Vec<String> {
        self.get(&[KEY_BUTTONS])
            .and_then(Value::as_object)
            .map(|buttons| buttons.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// A plain coordinate stored under `click_locations.<name>`
    pub fn click_location(&self, name: &str) -> Option<Point> {
        self.get(&[KEY_CLICK_LOCATIONS, name])
            .and_then(Point::from_json)
    }

    pub fn work_folder(&self) -> PathBuf {
        self.string(KEY_WORK_FOLDER)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("laser"))
    }

    /// File extension of work items, without the leading dot
    pub fn file_extension(&self) -> String {
        self.string(KEY_FILE_EXTENSION)
            .map(|ext| ext.trim_start_matches('.').to_string())
            .unwrap_or_else(|| "dwg".to_string())
    }

    pub fn window_title(&self) -> Option<String> {
        self.string(KEY_WINDOW_TITLE)
    }

    pub fn cancel_key(&self) -> String {
        self.string(KEY_CANCEL_KEY)
            .unwrap_or_else(|| "esc".to_string())
    }

    pub fn failure_policy(&self) -> FailurePolicy {
        match self.string(KEY_FAILURE_POLICY) {
            Some(raw) => raw.parse().unwrap_or_else(|e| {
                warn!("{}, falling back to fail-fast", e);
                FailurePolicy::FailFast
            }),
            None => FailurePolicy::FailFast,
        }
    }

    fn string(&self, key: &str) -> Option<String> {
        self.get(&[key])
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    }
}

/// Pretty-printed write through a sibling temp file and an atomic rename
fn write_document(path: &Path, document: &Value) -> Result<(), AutomationError> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    serde_json::to_writer_pretty(&mut tmp, document)?;
    tmp.write_all(b"\n")?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| AutomationError::Io(e.error))?;

    debug!(path = %path.display(), "Config persisted");
    Ok(())
}

fn ensure_object(value: &mut Value) -> &mut Map<String, Value> {
    if !value.is_object() {
        *value = Value::Object(Map::new());
    }
    match value {
        Value::Object(map) => map,
        _ => unreachable!("value was just replaced with an object"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_merge_overrides_leaf_and_keeps_siblings() {
        let defaults = json!({"a": {"x": 1, "y": 2}});
        let persisted = json!({"a": {"y": 9}});
        assert_eq!(merge(&defaults, &persisted), json!({"a": {"x": 1, "y": 9}}));
    }

    #[test]
    fn test_merge_recurses_at_every_depth() {
        let defaults = json!({"a": {"b": {"c": {"x": 1, "y": 2}, "keep": true}}, "top": 0});
        let persisted = json!({"a": {"b": {"c": {"y": 9}}}});
        assert_eq!(
            merge(&defaults, &persisted),
            json!({"a": {"b": {"c": {"x": 1, "y": 9}, "keep": true}}, "top": 0})
        );
    }

    #[test]
    fn test_merge_non_object_replaces_wholesale() {
        let defaults = json!({"a": {"x": 1}, "b": 5});
        let persisted = json!({"a": [1, 2], "b": {"nested": true}});
        assert_eq!(
            merge(&defaults, &persisted),
            json!({"a": [1, 2], "b": {"nested": true}})
        );
    }

    #[test]
    fn test_merge_is_order_independent_for_disjoint_keys() {
        let defaults = json!({"base": 1});
        let first = json!({"p": 1});
        let second = json!({"q": 2});
        let one_way = merge(&merge(&defaults, &first), &second);
        let other_way = merge(&merge(&defaults, &second), &first);
        assert_eq!(one_way["p"], other_way["p"]);
        assert_eq!(one_way["q"], other_way["q"]);
        assert_eq!(one_way["base"], other_way["base"]);
    }

    #[test]
    fn test_merge_does_not_touch_inputs() {
        let defaults = json!({"a": {"x": 1}});
        let persisted = json!({"a": {"x": 2}});
        let _ = merge(&defaults, &persisted);
        assert_eq!(defaults, json!({"a": {"x": 1}}));
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempdir().unwrap();
        let store = ConfigStore::open(dir.path().join("config.json"));
        assert_eq!(store.document(), &default_document());
    }

    #[test]
    fn test_corrupt_file_yields_defaults_only() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{\"import_delay\": 9.0, \"buttons\": ").unwrap();

        let store = ConfigStore::open(&path);
        assert_eq!(store.document(), &default_document());
        assert_eq!(store.delay("import_delay", 0.0), Duration::from_secs(3));
    }

    #[test]
    fn test_partial_document_is_merged_and_unknown_keys_survive() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(
            &path,
            r#"{"import_delay": 5.5, "buttons": {"ok": {"fallback_coords": [10, 20]}}, "operator": {"name": "night shift"}}"#,
        )
        .unwrap();

        let mut store = ConfigStore::open(&path);
        assert_eq!(store.delay("import_delay", 0.0), Duration::from_secs_f64(5.5));
        let ok = store.element_location("ok");
        assert_eq!(ok.fallback, Some(Point::new(10, 20)));
        assert_eq!(ok.image, Some(PathBuf::from("screenshots/ok.png")));

        store.set_last_processed_index(2).unwrap();
        let reloaded: Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(reloaded["operator"], json!({"name": "night shift"}));
        assert_eq!(reloaded["last_processed_index"], json!(2));
    }

    #[test]
    fn test_get_returns_none_for_missing_or_non_object_segments() {
        let dir = tempdir().unwrap();
        let store = ConfigStore::open(dir.path().join("config.json"));
        assert!(store.get(&["nope"]).is_none());
        assert!(store.get(&["import_delay", "deeper"]).is_none());
        assert!(store.get(&["buttons", "ok", "fallback_coords"]).is_none());
        assert_eq!(store.get(&["buttons", "ok", "image"]), Some(&json!("screenshots/ok.png")));
    }

    #[test]
    fn test_set_creates_intermediates_and_persists_synchronously() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let mut store = ConfigStore::open(&path);

        store.set(&["click_locations", "open_menu", "extra"], json!(true)).unwrap();

        let on_disk: Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(on_disk["click_locations"]["open_menu"]["extra"], json!(true));

        let reopened = ConfigStore::open(&path);
        assert_eq!(reopened.document(), store.document());
    }

    #[test]
    fn test_failed_persist_leaves_memory_unchanged() {
        let dir = tempdir().unwrap();
        // a directory where the file should be makes the final rename fail
        let path = dir.path().join("config.json");
        fs::create_dir(&path).unwrap();
        let mut store = ConfigStore::open(&path);
        assert_eq!(store.last_processed_index(), 0);

        assert!(store.set_last_processed_index(4).is_err());
        assert!(store.set(&["click_locations", "menu"], json!([1, 2])).is_err());

        assert_eq!(store.last_processed_index(), 0);
        assert!(store.get(&["click_locations", "menu"]).is_none());
        assert_eq!(store.document(), &default_document());
    }

    #[test]
    fn test_set_with_empty_path_is_rejected() {
        let dir = tempdir().unwrap();
        let mut store = ConfigStore::open(dir.path().join("config.json"));
        assert!(matches!(
            store.set(&[], json!(1)),
            Err(AutomationError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_set_replaces_scalar_intermediate_with_object() {
        let dir = tempdir().unwrap();
        let mut store = ConfigStore::open(dir.path().join("config.json"));
        store.set(&["window_title", "inner"], json!("x")).unwrap();
        assert_eq!(store.get(&["window_title", "inner"]), Some(&json!("x")));
    }

    #[test]
    fn test_delay_rejects_negative_and_non_numeric() {
        let dir = tempdir().unwrap();
        let mut store = ConfigStore::open(dir.path().join("config.json"));
        store.set(&["save_delay"], json!(-1.0)).unwrap();
        store.set(&["import_delay"], json!("slow")).unwrap();
        assert_eq!(store.delay("save_delay", 2.0), Duration::from_secs(2));
        assert_eq!(store.delay("import_delay", 3.0), Duration::from_secs(3));
        assert_eq!(store.delay("missing", 0.25), Duration::from_millis(250));
    }

    #[test]
    fn test_element_location_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        let mut store = ConfigStore::open(&path);
        store
            .set_element_location("ok", Path::new("shots/ok.png"), Point::new(640, 480))
            .unwrap();

        let reopened = ConfigStore::open(&path);
        let location = reopened.element_location("ok");
        assert_eq!(location.image, Some(PathBuf::from("shots/ok.png")));
        assert_eq!(location.fallback, Some(Point::new(640, 480)));
        assert!(!location.is_unresolved());
        assert!(!location.has_image_file());
    }

    #[test]
    fn test_unknown_button_is_unresolved() {
        let dir = tempdir().unwrap();
        let store = ConfigStore::open(dir.path().join("config.json"));
        assert!(store.element_location("does_not_exist").is_unresolved());
        assert_eq!(store.button_names(), vec!["save_to_geo".to_string(), "ok".to_string()]);
    }

    #[test]
    fn test_typed_accessors_fall_back_to_defaults() {
        let dir = tempdir().unwrap();
        let mut store = ConfigStore::open(dir.path().join("config.json"));
        assert_eq!(store.file_extension(), "dwg");
        assert_eq!(store.cancel_key(), "esc");
        assert_eq!(store.failure_policy(), FailurePolicy::FailFast);

        store.set(&[KEY_FILE_EXTENSION], json!(".DXF")).unwrap();
        store.set(&[KEY_FAILURE_POLICY], json!("skip_item")).unwrap();
        assert_eq!(store.file_extension(), "DXF");
        assert_eq!(store.failure_policy(), FailurePolicy::SkipItem);

        store.set(&[KEY_FAILURE_POLICY], json!("bogus")).unwrap();
        assert_eq!(store.failure_policy(), FailurePolicy::FailFast);
    }
}
