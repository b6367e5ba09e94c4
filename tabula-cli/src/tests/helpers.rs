//! Test helpers for scratch workspaces, PBF fixtures and canned diff sources.

use super::*;
use crate::poll::{DiffSourceBuilder, PollConfig};
use base64::{Engine as _, engine::general_purpose};
use camino::Utf8PathBuf;
use std::{fs, rc::Rc};
use tabula_core::Watermark;
use tabula_data::fetch::test_support::StubDiffSource;
use tabula_data::{DiffSource, FetchError};
use tempfile::TempDir;

/// Temporary directory addressed through UTF-8 paths.
#[derive(Debug)]
pub(super) struct Workspace {
    _tmp: TempDir,
    root: Utf8PathBuf,
}

impl Workspace {
    pub(super) fn new() -> Self {
        let tmp = TempDir::new().expect("tempdir");
        let root = Utf8PathBuf::from_path_buf(tmp.path().to_path_buf()).expect("utf-8 workspace");
        Self { _tmp: tmp, root }
    }

    pub(super) fn root(&self) -> &Utf8Path {
        &self.root
    }

    pub(super) fn path(&self, name: &str) -> Utf8PathBuf {
        self.root.join(name)
    }
}

pub(super) fn write_utf8(path: &Utf8Path, contents: &[u8]) {
    fs::write(path, contents).unwrap_or_else(|err| panic!("failed to write {path}: {err}"));
}

pub(super) fn read_utf8(path: &Utf8Path) -> String {
    fs::read_to_string(path).unwrap_or_else(|err| panic!("failed to read {path}: {err}"))
}

/// Decode one of the data crate's Base64 PBF fixtures to `dest`.
pub(super) fn decode_fixture(stem: &str, dest: &Utf8Path) {
    let encoded_path = Utf8PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("../tabula-data/tests/fixtures")
        .join(format!("{stem}.osm.pbf.b64"));
    let cleaned: String = read_utf8(&encoded_path)
        .chars()
        .filter(|ch| !ch.is_ascii_whitespace())
        .collect();
    let decoded = general_purpose::STANDARD
        .decode(cleaned.as_bytes())
        .unwrap_or_else(|err| panic!("failed to decode fixture {encoded_path}: {err}"));
    write_utf8(dest, &decoded);
}

/// Shares one [`StubDiffSource`] between the builder and the test.
#[derive(Debug)]
pub(super) struct SharedStub(Rc<StubDiffSource>);

impl DiffSource for SharedStub {
    fn fetch(&self, watermark: Watermark) -> Result<String, FetchError> {
        self.0.fetch(watermark)
    }
}

/// Hands out the same stub on every build.
#[derive(Debug)]
pub(super) struct StubBuilder(pub(super) Rc<StubDiffSource>);

impl StubBuilder {
    pub(super) fn new(stub: StubDiffSource) -> Self {
        Self(Rc::new(stub))
    }

    pub(super) fn requests(&self) -> Vec<Watermark> {
        self.0.requests()
    }
}

impl DiffSourceBuilder for StubBuilder {
    fn build(&self, _config: &PollConfig) -> Result<Box<dyn DiffSource>, CliError> {
        Ok(Box::new(SharedStub(Rc::clone(&self.0))))
    }
}
