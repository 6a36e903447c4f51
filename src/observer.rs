//! Tree reconciliation: walks a root directory, keeps to the subtrees the
//! route table knows about, and turns every recognized blob into a lazily
//! decoded [`Observation`].

use crate::config::UnknownViewPolicy;
use crate::db::Db;
use crate::dispatch::Dispatch;
use crate::errors::{StoreError, StoreResult};
use crate::models::{Record, Relationship, ResourceType};
use crate::paths::filename_shape;
use once_cell::sync::OnceCell;
use serde_json::{Map, Value};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use walkdir::WalkDir;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldShape {
    pub name: String,
    pub relationship: Option<Relationship>,
}

/// The fields an observation of one `(type, view)` pair carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shape {
    kind: Arc<ResourceType>,
    view: String,
    fields: Vec<FieldShape>,
}

impl Shape {
    pub fn for_view(kind: Arc<ResourceType>, view: &str) -> StoreResult<Self> {
        let fields = kind
            .view_fields(view)?
            .iter()
            .map(|name| FieldShape {
                name: name.clone(),
                relationship: kind.relationship_for(name).cloned(),
            })
            .collect();
        Ok(Self {
            kind,
            view: view.to_string(),
            fields,
        })
    }

    pub fn kind(&self) -> &Arc<ResourceType> {
        &self.kind
    }

    pub fn view(&self) -> &str {
        &self.view
    }

    pub fn fields(&self) -> &[FieldShape] {
        &self.fields
    }

    /// Keeps the declared fields of `raw`, in view order. Absent fields are null.
    fn project(&self, mut raw: Map<String, Value>) -> Map<String, Value> {
        self.fields
            .iter()
            .map(|field| {
                let value = raw.remove(&field.name).unwrap_or(Value::Null);
                (field.name.clone(), value)
            })
            .collect()
    }
}

/// Where an observation's data comes from: a db able to decode the file at
/// `path`.
#[derive(Debug, Clone)]
pub struct Source<'db> {
    db: &'db Db,
    path: PathBuf,
}

impl<'db> Source<'db> {
    pub fn new(db: &'db Db, path: PathBuf) -> Self {
        Self { db, path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn observe(&self) -> StoreResult<Value> {
        self.db.read_file(&self.path)
    }
}

/// One blob seen during a walk or an explicit read. The file is decoded the
/// first time its value is needed and never again.
#[derive(Debug)]
pub struct Observation<'db> {
    source: Source<'db>,
    shape: Arc<Shape>,
    extension: String,
    value: OnceCell<StoreResult<Map<String, Value>>>,
}

impl<'db> Observation<'db> {
    pub fn new(source: Source<'db>, shape: Arc<Shape>, extension: String) -> Self {
        Self {
            source,
            shape,
            extension,
            value: OnceCell::new(),
        }
    }

    pub fn resource_type(&self) -> &Arc<ResourceType> {
        self.shape.kind()
    }

    pub fn view(&self) -> &str {
        self.shape.view()
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn source(&self) -> &Source<'db> {
        &self.source
    }

    pub fn path(&self) -> &Path {
        self.source.path()
    }

    pub fn is_materialized(&self) -> bool {
        self.value.get().is_some()
    }

    pub fn materialize(&self) -> StoreResult<&Map<String, Value>> {
        self.value
            .get_or_init(|| self.load())
            .as_ref()
            .map_err(Clone::clone)
    }

    pub fn get(&self, field: &str) -> StoreResult<Option<&Value>> {
        Ok(self.materialize()?.get(field))
    }

    pub fn to_record(&self) -> StoreResult<Record> {
        Ok(Record::with_fields(
            Arc::clone(self.shape.kind()),
            self.materialize()?.clone(),
        ))
    }

    fn load(&self) -> StoreResult<Map<String, Value>> {
        match self.source.observe()? {
            Value::Object(raw) => Ok(self.shape.project(raw)),
            other => Err(StoreError::Codec(format!(
                "{} holds {} instead of an object",
                self.source.path().to_string_lossy(),
                json_kind(&other)
            ))),
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Normal components of `path` as strings, the unit the route table matches.
pub(crate) fn relative_segments(path: &Path) -> Vec<String> {
    path.components()
        .filter_map(|component| match component {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WalkStats {
    pub directories_visited: usize,
    pub directories_pruned: usize,
    pub files_seen: usize,
    pub files_matched: usize,
    pub files_skipped: usize,
}

/// Depth-first walk over a root, sorted by file name. A directory whose
/// relative path has no route is pruned; a file becomes an observation when
/// its extension is accepted, its path ends on a type's route and its name
/// follows the blob convention.
pub struct TreeWalk<'db> {
    db: &'db Db,
    root: PathBuf,
    entries: walkdir::IntoIter,
    stats: WalkStats,
}

impl<'db> TreeWalk<'db> {
    pub(crate) fn new(db: &'db Db, root: &Path) -> Self {
        Self {
            db,
            root: root.to_path_buf(),
            entries: WalkDir::new(root)
                .follow_links(false)
                .sort_by_file_name()
                .into_iter(),
            stats: WalkStats::default(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn stats(&self) -> WalkStats {
        self.stats
    }

    fn segments(&self, path: &Path) -> Vec<String> {
        relative_segments(path.strip_prefix(&self.root).unwrap_or(path))
    }

    fn skip(&mut self, path: &Path, reason: &str) -> StoreResult<Option<Observation<'db>>> {
        self.stats.files_skipped += 1;
        tracing::debug!(path = %path.to_string_lossy(), reason, "skipping file");
        Ok(None)
    }

    fn observe_file(&mut self, path: &Path) -> StoreResult<Option<Observation<'db>>> {
        let db = self.db;
        self.stats.files_seen += 1;
        if !db.understands_extension(path) {
            return self.skip(path, "extension not accepted");
        }
        let segments = self.segments(path);
        let Some(kind) = db.routes().resolve(&segments) else {
            return self.skip(path, "outside any resource type");
        };
        let Some((view, ext)) = path
            .file_name()
            .and_then(|name| name.to_str())
            .and_then(filename_shape)
        else {
            return self.skip(path, "not a resource blob");
        };
        if !kind.has_view(&view) {
            match db.unknown_view_policy() {
                UnknownViewPolicy::Skip => {
                    tracing::warn!(
                        path = %path.to_string_lossy(),
                        kind = %kind.name(),
                        view = %view,
                        "skipping blob for undeclared view"
                    );
                    self.stats.files_skipped += 1;
                    return Ok(None);
                }
                UnknownViewPolicy::Fail => {
                    return Err(StoreError::AmbiguousPerspective(format!(
                        "type '{}' declares no view '{}' ({})",
                        kind.name(),
                        view,
                        path.to_string_lossy()
                    )))
                }
            }
        }

        let shape = db.shape_for(kind, &view)?;
        self.stats.files_matched += 1;
        Ok(Some(Observation::new(
            Source::new(db, path.to_path_buf()),
            shape,
            ext,
        )))
    }
}

impl<'db> Iterator for TreeWalk<'db> {
    type Item = StoreResult<Observation<'db>>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let entry = match self.entries.next()? {
                Ok(entry) => entry,
                Err(error) => return Some(Err(StoreError::from(error))),
            };
            if entry.depth() == 0 {
                continue;
            }
            let path = entry.path();

            if entry.file_type().is_dir() {
                let segments = self.segments(path);
                if self.db.routes().lookup_silent(&segments).is_some() {
                    self.stats.directories_visited += 1;
                } else {
                    tracing::debug!(path = %path.to_string_lossy(), "pruning unrouted directory");
                    self.stats.directories_pruned += 1;
                    self.entries.skip_current_dir();
                }
                continue;
            }
            if !entry.file_type().is_file() {
                continue;
            }

            match self.observe_file(path) {
                Ok(Some(observation)) => return Some(Ok(observation)),
                Ok(None) => continue,
                Err(error) => return Some(Err(error)),
            }
        }
    }
}

/// Walks trees on behalf of a db and hands every observation to the handlers
/// registered for its type.
pub struct Observer<'db, 'h> {
    db: &'db Db,
    dispatch: Dispatch<'h>,
}

impl<'db, 'h> Observer<'db, 'h> {
    pub fn new(db: &'db Db) -> Self {
        Self {
            db,
            dispatch: Dispatch::default(),
        }
    }

    pub fn db(&self) -> &'db Db {
        self.db
    }

    pub fn on<F>(&mut self, kind: &ResourceType, handler: F) -> &mut Self
    where
        F: FnMut(&Observation<'_>) + 'h,
    {
        if self.db.find_type(kind.name()).is_none() {
            tracing::warn!(
                kind = %kind.name(),
                "handler registered for a type this db does not route; it will never run"
            );
        }
        self.dispatch.register(kind.name(), Box::new(handler));
        self
    }

    pub fn dispatch(&self) -> &Dispatch<'h> {
        &self.dispatch
    }

    /// Walks `root` to the end, dispatching as it goes. The first filesystem
    /// or policy error stops the walk.
    pub fn read_tree(&mut self, root: &Path) -> StoreResult<WalkStats> {
        let mut walk = self.db.each_resource(root);
        let mut dispatched = 0usize;
        for observation in walk.by_ref() {
            let observation = observation?;
            dispatched += self.dispatch.dispatch(&observation);
        }
        let stats = walk.stats();
        tracing::debug!(
            root = %root.to_string_lossy(),
            matched = stats.files_matched,
            pruned = stats.directories_pruned,
            dispatched,
            "tree read"
        );
        Ok(stats)
    }

    /// Reads one blob strictly and dispatches it. Returns how many handlers ran.
    pub fn read_path(&mut self, root: &Path, path: &Path) -> StoreResult<usize> {
        let observation = self.db.read(root, path)?;
        Ok(self.dispatch.dispatch(&observation))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DbConfig;
    use std::cell::RefCell;
    use std::fs;

    fn item_type() -> Arc<ResourceType> {
        Arc::new(
            ResourceType::new("Item")
                .view("default", ["name", "price"])
                .identify("flat_db", ["uuid"]),
        )
    }

    fn write(root: &Path, relative: &str, content: &str) {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().expect("parent")).expect("create dirs");
        fs::write(path, content).expect("write file");
    }

    #[test]
    fn observations_decode_lazily_and_once() {
        let root = tempfile::tempdir().expect("temp root");
        write(root.path(), "item/7/resource-default.json", r#"{"name": "torch", "price": 10, "extra": 1}"#);
        let db = Db::new([item_type()], DbConfig::default()).expect("db");

        let observation = db
            .each_resource(root.path())
            .next()
            .expect("one observation")
            .expect("no error");
        assert!(!observation.is_materialized());
        assert_eq!(observation.view(), "default");
        assert_eq!(observation.extension(), ".json");

        let fields = observation.materialize().expect("decode");
        assert_eq!(fields.len(), 2);
        assert!(observation.is_materialized());

        fs::remove_file(observation.path()).expect("remove blob");
        assert_eq!(
            observation.get("name").expect("cached value"),
            Some(&Value::String("torch".to_string()))
        );
    }

    #[test]
    fn non_object_blobs_fail_on_materialize() {
        let root = tempfile::tempdir().expect("temp root");
        write(root.path(), "item/7/resource-default.json", "[1, 2]");
        let db = Db::new([item_type()], DbConfig::default()).expect("db");
        let observation = db
            .each_resource(root.path())
            .next()
            .expect("one observation")
            .expect("no error");
        let error = observation.materialize().expect_err("array is not a record");
        assert!(matches!(error, StoreError::Codec(_)));
    }

    #[test]
    fn undeclared_views_follow_the_policy() {
        let root = tempfile::tempdir().expect("temp root");
        write(root.path(), "item/7/resource-summary.json", r#"{"name": "torch"}"#);

        let db = Db::new([item_type()], DbConfig::default()).expect("db");
        let mut walk = db.each_resource(root.path());
        assert!(walk.next().is_none());
        assert_eq!(walk.stats().files_skipped, 1);

        let strict = Db::new(
            [item_type()],
            DbConfig::default().with_unknown_view(UnknownViewPolicy::Fail),
        )
        .expect("db");
        let error = strict
            .each_resource(root.path())
            .next()
            .expect("an item")
            .expect_err("undeclared view");
        assert!(matches!(error, StoreError::AmbiguousPerspective(_)));
    }

    #[test]
    fn handlers_run_in_registration_order() {
        let root = tempfile::tempdir().expect("temp root");
        write(root.path(), "item/7/resource-default.json", r#"{"name": "torch", "price": 10}"#);
        let db = Db::new([item_type()], DbConfig::default()).expect("db");

        let calls = RefCell::new(Vec::new());
        let kind = item_type();
        let mut observer = db.observer();
        observer
            .on(&kind, |_| calls.borrow_mut().push("first"))
            .on(&kind, |_| calls.borrow_mut().push("second"));
        let stats = observer.read_tree(root.path()).expect("read tree");
        drop(observer);

        assert_eq!(stats.files_matched, 1);
        assert_eq!(calls.into_inner(), vec!["first", "second"]);
    }

    #[test]
    fn missing_root_is_an_io_error() {
        let root = tempfile::tempdir().expect("temp root");
        let db = Db::new([item_type()], DbConfig::default()).expect("db");
        let error = db.observer().read_tree(&root.path().join("absent")).expect_err("missing root");
        assert!(matches!(error, StoreError::Io(_)));
    }
}
