use crate::codec::{CodecRegistry, Encoded};
use crate::config::{DbConfig, UnknownViewPolicy};
use crate::errors::{StoreError, StoreResult};
use crate::models::{Cardinality, Relationship, Resource, ResourceType};
use crate::observer::{relative_segments, Observation, Observer, Shape, Source, TreeWalk};
use crate::paths::{self, filename_shape, identity_segments, path_pattern};
use crate::planner::{self, Action, ActionSink, FsSink};
use crate::routes::{RouteTable, Segment};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex};

pub const DEFAULT_VIEW: &str = "default";

/// Coordinates resource types, their routes and the on-disk formats.
///
/// Every type gets the route `<base>/<one wildcard per identity field>/<blob>`
/// under the configured identifying scheme. Walks and explicit reads resolve
/// files through that table only.
#[derive(Debug)]
pub struct Db {
    types: Vec<Arc<ResourceType>>,
    extensions: Vec<String>,
    identifying_scheme: String,
    unknown_view: UnknownViewPolicy,
    routes: RouteTable<Arc<ResourceType>>,
    codecs: CodecRegistry,
    shapes: Mutex<HashMap<(String, String), Arc<Shape>>>,
}

impl Db {
    pub fn new<I>(types: I, config: DbConfig) -> StoreResult<Self>
    where
        I: IntoIterator<Item = Arc<ResourceType>>,
    {
        Self::with_codecs(types, config, CodecRegistry::default())
    }

    pub fn with_codecs<I>(types: I, config: DbConfig, codecs: CodecRegistry) -> StoreResult<Self>
    where
        I: IntoIterator<Item = Arc<ResourceType>>,
    {
        config.validate()?;
        let extensions = config.ordered_extensions();
        if let Some(missing) = extensions.iter().find(|ext| !codecs.contains(ext)) {
            return Err(StoreError::Config(format!("no codec registered for '{}'", missing)));
        }

        let mut db = Self {
            types: Vec::new(),
            extensions,
            identifying_scheme: config.identifying_scheme,
            unknown_view: config.unknown_view,
            routes: RouteTable::new(),
            codecs,
            shapes: Mutex::new(HashMap::new()),
        };
        for kind in types {
            db.register_type(kind)?;
        }
        tracing::debug!(
            types = db.types.len(),
            extensions = ?db.extensions,
            scheme = %db.identifying_scheme,
            "db ready"
        );
        Ok(db)
    }

    /// Adds a type and extends the route table with its pattern.
    pub fn register_type(&mut self, kind: Arc<ResourceType>) -> StoreResult<()> {
        if self.find_type(kind.name()).is_some() {
            return Err(StoreError::AlreadyKnown(format!(
                "type '{}' is already registered",
                kind.name()
            )));
        }
        let mut pattern = path_pattern(&kind, &self.identifying_scheme)?;
        pattern.push(Segment::Wildcard);
        self.routes.register(&pattern, Arc::clone(&kind))?;
        tracing::debug!(
            kind = %kind.name(),
            route = %crate::routes::pattern_to_string(&pattern),
            "registered resource type"
        );
        self.types.push(kind);
        Ok(())
    }

    pub fn types(&self) -> &[Arc<ResourceType>] {
        &self.types
    }

    pub fn find_type(&self, name: &str) -> Option<&Arc<ResourceType>> {
        self.types.iter().find(|kind| kind.name() == name)
    }

    pub fn extensions(&self) -> &[String] {
        &self.extensions
    }

    pub fn identifying_scheme(&self) -> &str {
        &self.identifying_scheme
    }

    pub fn unknown_view_policy(&self) -> UnknownViewPolicy {
        self.unknown_view
    }

    pub fn routes(&self) -> &RouteTable<Arc<ResourceType>> {
        &self.routes
    }

    pub fn accepts_extension(&self, ext: &str) -> bool {
        self.extensions.iter().any(|known| known == ext)
    }

    pub fn understands_extension(&self, path: &Path) -> bool {
        extension_of(path).is_some_and(|ext| self.accepts_extension(&ext))
    }

    pub fn basename_for(&self, view: &str, ext: &str) -> String {
        paths::basename_for(view, ext)
    }

    pub fn filename_shape(&self, basename: &str) -> Option<(String, String)> {
        filename_shape(basename)
    }

    /// Decodes the file at `path` with the codec of its extension.
    pub fn read_file(&self, path: &Path) -> StoreResult<Value> {
        let ext = extension_of(path)
            .filter(|ext| self.accepts_extension(ext))
            .ok_or_else(|| {
                StoreError::UnsupportedExtension(format!(
                    "don't know the extension of {}, use one of [{}]",
                    path.to_string_lossy(),
                    self.extensions.join(", ")
                ))
            })?;
        let codec = self
            .codecs
            .get(&ext)
            .ok_or_else(|| StoreError::Config(format!("no codec registered for '{}'", ext)))?;
        let bytes = fs::read(path)
            .map_err(|error| StoreError::Io(format!("{}: {}", path.to_string_lossy(), error)))?;
        codec.decode(&bytes).map_err(|error| {
            StoreError::Codec(format!("{}: {}", path.to_string_lossy(), error))
        })
    }

    /// Directory owned by `resource` under `root`.
    pub fn path_for(&self, root: &Path, resource: &dyn Resource) -> StoreResult<PathBuf> {
        let kind = resource.resource_type();
        if self.find_type(kind.name()).is_none() {
            return Err(StoreError::UnknownType(format!(
                "type '{}' is not registered with this db",
                kind.name()
            )));
        }
        let relative = paths::compose_path(resource, &self.identifying_scheme)?;
        Ok(root.join(relative))
    }

    /// Projects `resource` onto `view`. Relationship fields hold the relative
    /// paths of the related resources.
    pub fn view_value(&self, resource: &dyn Resource, view: &str) -> StoreResult<Value> {
        let kind = resource.resource_type();
        let fields = kind.view_fields(view)?;
        let mut object = Map::new();
        for field in fields {
            let value = match kind.relationship_for(field) {
                Some(relationship) => self.link_value(resource, field, relationship)?,
                None => resource.field(field).ok_or_else(|| {
                    StoreError::MissingField(format!(
                        "type '{}' has no value for '{}' in view '{}'",
                        kind.name(),
                        field,
                        view
                    ))
                })?,
            };
            object.insert(field.clone(), value);
        }
        Ok(Value::Object(object))
    }

    fn link_value(
        &self,
        resource: &dyn Resource,
        field: &str,
        relationship: &Relationship,
    ) -> StoreResult<Value> {
        let mut links = Vec::new();
        for related in resource.related(field) {
            let segments = identity_segments(related, &self.identifying_scheme)?;
            links.push(Value::String(segments.join("/")));
        }
        match relationship.cardinality {
            Cardinality::Many => Ok(Value::Array(links)),
            Cardinality::One if links.len() > 1 => Err(StoreError::InvalidIdentity(format!(
                "relationship '{}' holds one {} but {} were given",
                field,
                relationship.target,
                links.len()
            ))),
            Cardinality::One => Ok(links.pop().unwrap_or(Value::Null)),
        }
    }

    pub fn encode(&self, resource: &dyn Resource, view: &str, ext: &str) -> StoreResult<Encoded> {
        if !self.accepts_extension(ext) {
            return Err(StoreError::UnsupportedExtension(format!(
                "'{}' is not one of [{}]",
                ext,
                self.extensions.join(", ")
            )));
        }
        let codec = self
            .codecs
            .get(ext)
            .ok_or_else(|| StoreError::Config(format!("no codec registered for '{}'", ext)))?;
        let value = self.view_value(resource, view)?;
        codec.encode(&value).map_err(StoreError::from)
    }

    pub fn plan<'a>(
        &self,
        root: &Path,
        resources: &[&'a dyn Resource],
        views: &[&str],
        exts: &[&str],
    ) -> StoreResult<Vec<Action<'a>>> {
        planner::plan(self, root, resources, views, exts)
    }

    pub fn perform(&self, action: &Action<'_>) -> StoreResult<()> {
        FsSink.perform(self, action)
    }

    /// Runs `actions` in order through `sink`, stopping at the first failure.
    /// Actions already performed stay applied.
    pub fn execute(&self, actions: &[Action<'_>], sink: &mut dyn ActionSink) -> StoreResult<usize> {
        for (index, action) in actions.iter().enumerate() {
            if let Err(error) = sink.perform(self, action) {
                tracing::warn!(
                    path = %action.path().to_string_lossy(),
                    performed = index,
                    error = %error,
                    "save batch stopped"
                );
                return Err(error);
            }
        }
        Ok(actions.len())
    }

    /// Saves one resource. `view` defaults to `default` and `exts` to every
    /// accepted extension.
    pub fn save(
        &self,
        root: &Path,
        resource: &dyn Resource,
        view: Option<&str>,
        exts: Option<&[&str]>,
    ) -> StoreResult<usize> {
        let view = view.unwrap_or(DEFAULT_VIEW);
        match exts {
            Some(exts) => self.batch_save(root, &[resource], &[view], exts),
            None => {
                let all: Vec<&str> = self.extensions.iter().map(String::as_str).collect();
                self.batch_save(root, &[resource], &[view], &all)
            }
        }
    }

    pub fn batch_save(
        &self,
        root: &Path,
        resources: &[&dyn Resource],
        views: &[&str],
        exts: &[&str],
    ) -> StoreResult<usize> {
        let actions = self.plan(root, resources, views, exts)?;
        let performed = self.execute(&actions, &mut FsSink)?;
        tracing::info!(
            root = %root.to_string_lossy(),
            resources = resources.len(),
            actions = performed,
            "saved batch"
        );
        Ok(performed)
    }

    /// Reads one blob by path, resolving its type through the route table.
    /// Unlike a walk, anything the db cannot interpret is an error.
    pub fn read(&self, root: &Path, path: &Path) -> StoreResult<Observation<'_>> {
        let full = if path.is_absolute() {
            path.to_path_buf()
        } else {
            root.join(path)
        };
        let outside = || {
            StoreError::NoSuchRoute(format!(
                "{} is outside {}",
                full.to_string_lossy(),
                root.to_string_lossy()
            ))
        };
        let relative = full.strip_prefix(root).map_err(|_| outside())?;
        if !relative
            .components()
            .all(|component| matches!(component, Component::Normal(_)))
        {
            return Err(outside());
        }
        if !self.understands_extension(&full) {
            return Err(StoreError::UnsupportedExtension(format!(
                "don't know the extension of {}, use one of [{}]",
                full.to_string_lossy(),
                self.extensions.join(", ")
            )));
        }

        let segments = relative_segments(relative);
        let kind = self
            .routes
            .resolve(&segments)
            .ok_or_else(|| StoreError::NoSuchRoute(segments.join("/")))?;
        let (view, ext) = full
            .file_name()
            .and_then(|name| name.to_str())
            .and_then(filename_shape)
            .ok_or_else(|| {
                StoreError::NoSuchRoute(format!("{} is not a resource blob", full.to_string_lossy()))
            })?;
        if !kind.has_view(&view) {
            return Err(StoreError::AmbiguousPerspective(format!(
                "type '{}' declares no view '{}' ({})",
                kind.name(),
                view,
                full.to_string_lossy()
            )));
        }
        let shape = self.shape_for(kind, &view)?;
        Ok(Observation::new(Source::new(self, full), shape, ext))
    }

    /// Reads back the blob stored for `resource` under `view` and `ext`.
    pub fn fetch(
        &self,
        root: &Path,
        resource: &dyn Resource,
        view: &str,
        ext: &str,
    ) -> StoreResult<Observation<'_>> {
        let path = self.path_for(root, resource)?.join(paths::basename_for(view, ext));
        self.read(root, &path)
    }

    /// Removes the blobs this db recognizes in the resource's directory and
    /// leaves anything else in place. Returns how many files were removed.
    pub fn delete(&self, root: &Path, resource: &dyn Resource) -> StoreResult<usize> {
        let dir = self.path_for(root, resource)?;
        let kind = resource.resource_type();
        let io_error = |error: std::io::Error| StoreError::Io(format!("{}: {}", dir.to_string_lossy(), error));
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(error) if error.kind() == ErrorKind::NotFound => return Ok(0),
            Err(error) => return Err(io_error(error)),
        };

        let mut removed = 0usize;
        for entry in entries {
            let entry = entry.map_err(io_error)?;
            let path = entry.path();
            if !entry.file_type().map_err(io_error)?.is_file() || !self.is_managed_blob(&kind, &path) {
                continue;
            }
            fs::remove_file(&path)
                .map_err(|error| StoreError::Io(format!("{}: {}", path.to_string_lossy(), error)))?;
            removed += 1;
        }
        tracing::info!(path = %dir.to_string_lossy(), removed, "deleted resource blobs");
        Ok(removed)
    }

    /// Removes the resource's whole directory, unmanaged files included.
    pub fn delete_completely(&self, root: &Path, resource: &dyn Resource) -> StoreResult<bool> {
        let dir = self.path_for(root, resource)?;
        match fs::remove_dir_all(&dir) {
            Ok(()) => {
                tracing::info!(path = %dir.to_string_lossy(), "deleted resource directory");
                Ok(true)
            }
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(false),
            Err(error) => Err(StoreError::Io(format!("{}: {}", dir.to_string_lossy(), error))),
        }
    }

    /// A file this db could have written for a resource of `kind`: accepted
    /// extension, blob-shaped name and a view the type declares.
    fn is_managed_blob(&self, kind: &ResourceType, path: &Path) -> bool {
        self.understands_extension(path)
            && path
                .file_name()
                .and_then(|name| name.to_str())
                .and_then(filename_shape)
                .is_some_and(|(view, _)| kind.has_view(&view))
    }

    /// Lazily walks `root`, yielding one observation per recognized blob.
    pub fn each_resource(&self, root: &Path) -> TreeWalk<'_> {
        TreeWalk::new(self, root)
    }

    pub fn observer<'h>(&self) -> Observer<'_, 'h> {
        Observer::new(self)
    }

    /// Shape descriptor for `(kind, view)`, built on first request.
    pub fn shape_for(&self, kind: &Arc<ResourceType>, view: &str) -> StoreResult<Arc<Shape>> {
        let key = (kind.name().to_string(), view.to_string());
        let mut shapes = self
            .shapes
            .lock()
            .map_err(|_| StoreError::Internal("shape cache mutex poisoned".to_string()))?;
        if let Some(shape) = shapes.get(&key) {
            return Ok(Arc::clone(shape));
        }
        let shape = Arc::new(Shape::for_view(Arc::clone(kind), view)?);
        shapes.insert(key, Arc::clone(&shape));
        Ok(shape)
    }

    pub fn cached_shapes(&self) -> usize {
        self.shapes.lock().map(|shapes| shapes.len()).unwrap_or(0)
    }
}

/// Extension of `path` with its leading dot, the way blob names carry it.
fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|value| value.to_str())
        .map(|ext| format!(".{}", ext))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Record;
    use serde_json::json;

    fn item_type() -> Arc<ResourceType> {
        Arc::new(
            ResourceType::new("Item")
                .view("default", ["name", "price"])
                .identify("flat_db", ["uuid"]),
        )
    }

    struct Person {
        name: String,
        run_id: u32,
        items: Vec<Record>,
    }

    fn person_type() -> Arc<ResourceType> {
        Arc::new(
            ResourceType::new("Person")
                .view("default", ["name", "items"])
                .identify("flat_db", ["name", "run_id"])
                .relationship("items", "Item", Cardinality::Many),
        )
    }

    impl Resource for Person {
        fn resource_type(&self) -> Arc<ResourceType> {
            person_type()
        }

        fn field(&self, name: &str) -> Option<Value> {
            match name {
                "name" => Some(json!(self.name)),
                "run_id" => Some(json!(self.run_id)),
                _ => None,
            }
        }

        fn related(&self, name: &str) -> Vec<&dyn Resource> {
            match name {
                "items" => self.items.iter().map(|item| item as &dyn Resource).collect(),
                _ => Vec::new(),
            }
        }
    }

    #[test]
    fn registering_a_type_twice_fails() {
        let mut db = Db::new([item_type()], DbConfig::default()).expect("db");
        let error = db.register_type(item_type()).expect_err("duplicate");
        assert!(matches!(error, StoreError::AlreadyKnown(_)));
        assert_eq!(db.types().len(), 1);
    }

    #[test]
    fn late_registration_extends_routes() {
        let mut db = Db::new([item_type()], DbConfig::default()).expect("db");
        assert!(db.routes().lookup_silent(&["person"]).is_none());
        db.register_type(person_type()).expect("register person");
        assert_eq!(db.routes().len(), 2);
        let node = db
            .routes()
            .lookup_silent(&["person", "jon", "0", "resource-default.json"])
            .expect("person route");
        assert_eq!(node.content().map(|kind| kind.name()), Some("Person"));
        assert!(db.routes().lookup_silent(&["item", "7"]).is_some());
    }

    #[test]
    fn types_without_the_scheme_are_rejected() {
        let kind = Arc::new(ResourceType::new("Note").view("default", ["text"]).identify("default", ["id"]));
        let error = Db::new([kind], DbConfig::default()).expect_err("missing flat_db");
        assert!(matches!(error, StoreError::UnknownScheme(_)));
    }

    #[test]
    fn conflicting_base_paths_are_rejected() {
        let other = Arc::new(
            ResourceType::new("Gadget")
                .base_path(["item"])
                .view("default", ["name"])
                .identify("flat_db", ["uuid"]),
        );
        let error = Db::new([item_type(), other], DbConfig::default()).expect_err("conflict");
        assert!(matches!(error, StoreError::DuplicateRoute(_)));
    }

    #[test]
    fn extensions_need_codecs() {
        let config = DbConfig::default().with_extensions([".json", ".toml"]);
        let error = Db::new([item_type()], config).expect_err("no toml codec");
        assert!(matches!(error, StoreError::Config(_)));
    }

    #[test]
    fn extension_checks_use_the_accepted_set() {
        let db = Db::new([item_type()], DbConfig::default()).expect("db");
        assert!(db.understands_extension(Path::new("item/7/resource-default.json")));
        assert!(!db.understands_extension(Path::new("item/7/resource-default.yaml")));
        assert!(!db.understands_extension(Path::new("item/7/README")));

        let error = db
            .read_file(Path::new("item/7/resource-default.yaml"))
            .expect_err("yaml not accepted");
        assert!(matches!(error, StoreError::UnsupportedExtension(_)));
    }

    #[test]
    fn relationships_are_stored_as_paths() {
        let db = Db::new([item_type(), person_type()], DbConfig::default()).expect("db");
        let torch = Record::new(item_type()).set("name", "torch").set("price", 10).set("uuid", 7);
        let person = Person {
            name: "jon".to_string(),
            run_id: 0,
            items: vec![torch],
        };
        let value = db.view_value(&person, "default").expect("view value");
        assert_eq!(value, json!({"name": "jon", "items": ["item/7"]}));
    }

    #[test]
    fn missing_view_fields_are_reported() {
        let db = Db::new([item_type()], DbConfig::default()).expect("db");
        let partial = Record::new(item_type()).set("name", "torch").set("uuid", 7);
        let error = db.view_value(&partial, "default").expect_err("price missing");
        assert!(matches!(error, StoreError::MissingField(_)));
    }

    #[test]
    fn unregistered_types_have_no_path() {
        let db = Db::new([item_type()], DbConfig::default()).expect("db");
        let person = Person {
            name: "jon".to_string(),
            run_id: 0,
            items: Vec::new(),
        };
        let error = db.path_for(Path::new("root"), &person).expect_err("unknown type");
        assert!(matches!(error, StoreError::UnknownType(_)));
    }

    #[test]
    fn shapes_are_cached_per_type_and_view() {
        let db = Db::new([item_type()], DbConfig::default()).expect("db");
        let kind = Arc::clone(&db.types()[0]);
        let first = db.shape_for(&kind, "default").expect("shape");
        let second = db.shape_for(&kind, "default").expect("shape");
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(db.cached_shapes(), 1);
        assert!(db.shape_for(&kind, "all").is_err());
        assert_eq!(db.cached_shapes(), 1);
    }
}
