/*!
Human-edited settings files: local preferences and generated defaults.

Unlike the rotation files owned by the auto-save engine, these files are read
once at startup and are written rarely, so each write goes through a temporary
file in the same directory followed by an atomic rename.
*/

use crate::codec::{self, Writer};
use crate::error::Result;
use crate::schema::Schema;
use crate::store::Snapshot;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Comment written at the top of generated files
pub const DEFAULT_HEADER: &str = "Settings file. Lines starting with // are comments.";

/// A settings document stored at a fixed path
#[derive(Debug, Clone)]
pub struct SettingsFile {
    path: PathBuf,
    header: Option<String>,
}

impl SettingsFile {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            path: path.into(),
            header: Some(DEFAULT_HEADER.to_string()),
        }
    }

    /// Replace the generated header, or drop it with `None`
    pub fn with_header(mut self, header: Option<String>) -> Self {
        self.header = header;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    fn writer(&self) -> Writer {
        match &self.header {
            Some(header) => Writer::new().header(header.as_str()),
            None => Writer::new(),
        }
    }

    /// Read and parse the file, failing on any I/O or parse error
    pub fn read(&self, schema: &Schema) -> Result<Snapshot> {
        let text = fs::read_to_string(&self.path)?;
        let value = codec::parse(&text)?;
        Ok(Snapshot::from_value(schema.clone(), value)?)
    }

    /// Read the file and overlay its entries on `template`
    ///
    /// Any failure is traced and yields `template` unchanged, so a missing or
    /// corrupt file never prevents startup.
    pub fn load_or(&self, template: &Snapshot) -> Snapshot {
        match self.read(template.schema()) {
            Ok(loaded) => template.overlay(&loaded),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Settings file unusable, using defaults");
                template.clone()
            }
        }
    }

    /// Like [`load_or`](Self::load_or), but first writes a commented-out template
    /// when the file does not exist yet
    pub fn create_or_load(&self, template: &Snapshot) -> Snapshot {
        if !self.exists() {
            match self.write_template(template) {
                Ok(()) => info!(path = %self.path.display(), "Created settings template"),
                Err(e) => warn!(path = %self.path.display(), error = %e, "Could not create settings template"),
            }
            return template.clone();
        }
        self.load_or(template)
    }

    /// Write every schema property as a commented-out example of its default
    pub fn write_template(&self, defaults: &Snapshot) -> Result<()> {
        let entries = snapshot_entries(defaults);
        let text = self.writer().write_template(defaults.schema(), &entries);
        write_atomic(&self.path, text.as_bytes())
    }

    /// Write `defaults` as live values, each preceded by its documentation
    pub fn write_defaults(&self, defaults: &Snapshot) -> Result<()> {
        let entries = snapshot_entries(defaults);
        let text = self.writer().write_documented(defaults.schema(), &entries);
        write_atomic(&self.path, text.as_bytes())
    }

    /// Write `snapshot` as an indented document
    pub fn write(&self, snapshot: &Snapshot) -> Result<()> {
        let text = self.writer().write(&snapshot.to_value());
        write_atomic(&self.path, text.as_bytes())
    }
}

fn snapshot_entries(snapshot: &Snapshot) -> crate::value::ValueMap {
    snapshot
        .entries()
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

/// Replace `path` with `contents` so readers see either the old or the new file
pub(crate) fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;

    let mut temp = tempfile::NamedTempFile::new_in(dir)?;
    temp.write_all(contents)?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| e.error)?;
    debug!(path = %path.display(), bytes = contents.len(), "Wrote file atomically");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PrefError;
    use crate::schema::Property;
    use crate::types::{BooleanType, HostInteger, StringType};
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        file: SettingsFile,
        theme: Property<String>,
        tab: Property<u8>,
        wrap: Property<bool>,
        template: Snapshot,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let file = SettingsFile::new(dir.path().join("prefs").join("local.json"));
        let theme = Property::new("theme", StringType).with_doc("Color theme name");
        let tab = Property::new("tab.width", HostInteger::<u8>::new());
        let wrap = Property::new("wrap", BooleanType);
        let schema = Schema::builder()
            .property(&theme)
            .property(&tab)
            .property(&wrap)
            .build()
            .unwrap();
        let mut wc = crate::store::WorkingCopy::new(schema);
        wc.add_or_replace(&theme, &"light".to_string())
            .add_or_replace(&tab, &4);
        Fixture {
            _dir: dir,
            file,
            theme,
            tab,
            wrap,
            template: wc.commit(),
        }
    }

    #[test]
    fn test_create_or_load_writes_template_once() {
        let f = fixture();
        let first = f.file.create_or_load(&f.template);
        assert!(first.equal_to(&f.template));
        assert!(f.file.exists());

        let text = fs::read_to_string(f.file.path()).unwrap();
        assert!(text.starts_with("// Settings file."));
        assert!(text.contains("// Color theme name"));
        assert!(text.contains("// \"theme\": \"light\","));

        // The template is all comments, so loading it changes nothing
        let second = f.file.create_or_load(&f.template);
        assert!(second.equal_to(&f.template));
    }

    #[test]
    fn test_loaded_values_overlay_template() {
        let f = fixture();
        fs::create_dir_all(f.file.path().parent().unwrap()).unwrap();
        fs::write(f.file.path(), "{\n  // user override\n  \"tab.width\": 8,\n  \"wrap\": true,\n}\n").unwrap();

        let loaded = f.file.load_or(&f.template);
        assert_eq!(loaded.try_get(&f.tab), Some(8));
        assert_eq!(loaded.try_get(&f.wrap), Some(true));
        assert_eq!(loaded.try_get(&f.theme), Some("light".to_string()));
    }

    #[test]
    fn test_corrupt_file_falls_back_to_template() {
        let f = fixture();
        fs::create_dir_all(f.file.path().parent().unwrap()).unwrap();
        fs::write(f.file.path(), "{\"tab.width\": 8,, }").unwrap();

        assert!(matches!(f.file.read(f.template.schema()), Err(PrefError::Parse(_))));
        assert!(f.file.load_or(&f.template).equal_to(&f.template));
    }

    #[test]
    fn test_non_map_document_falls_back() {
        let f = fixture();
        fs::create_dir_all(f.file.path().parent().unwrap()).unwrap();
        fs::write(f.file.path(), "[1, 2]").unwrap();
        assert!(matches!(f.file.read(f.template.schema()), Err(PrefError::Validation(_))));
        assert!(f.file.load_or(&f.template).equal_to(&f.template));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let f = fixture();
        assert!(matches!(f.file.read(f.template.schema()), Err(PrefError::Io(_))));
    }

    #[test]
    fn test_write_defaults_round_trips() {
        let f = fixture();
        f.file.write_defaults(&f.template).unwrap();
        let text = fs::read_to_string(f.file.path()).unwrap();
        assert!(text.contains("  // Color theme name\n  \"theme\": \"light\""));

        let read = f.file.read(f.template.schema()).unwrap();
        assert!(read.equal_to(&f.template));
    }

    #[test]
    fn test_headerless_write() {
        let f = fixture();
        let file = f.file.clone().with_header(None);
        file.write(&f.template).unwrap();
        let text = fs::read_to_string(file.path()).unwrap();
        assert!(text.starts_with('{'));
        assert!(file.read(f.template.schema()).unwrap().equal_to(&f.template));
    }

    #[test]
    fn test_atomic_write_replaces_contents() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("file.txt");
        write_atomic(&path, b"first").unwrap();
        write_atomic(&path, b"second").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"second");
        // No temporary files left behind
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }
}
