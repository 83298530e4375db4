//! Shared fixtures for integration tests.
//!
//! Library archives are real zips built in memory and served from a
//! counting in-memory source, so tests never touch the network.

#![allow(dead_code)]

use std::collections::HashMap;
use std::io::{Cursor, Write};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use h5pack::adapters::Generator;
use h5pack::core::CompileOptions;
use h5pack::domain::LibraryIdentifier;
use h5pack::error::{CompileError, Result};
use h5pack::library::{LibraryResolver, LibrarySource, LibraryStore};
use h5pack::{Compiler, HandlerRegistry};
use tempfile::TempDir;
use zip::write::SimpleFileOptions;

/// Library description used to build a fixture archive
pub struct Lib {
    pub name: &'static str,
    pub major: u32,
    pub minor: u32,
    pub deps: Vec<(&'static str, u32, u32)>,
    pub js: Vec<&'static str>,
    /// Preloaded JS declared in the manifest but left out of the archive
    pub missing_js: Vec<&'static str>,
}

impl Lib {
    pub fn new(name: &'static str, major: u32, minor: u32) -> Self {
        Self {
            name,
            major,
            minor,
            deps: Vec::new(),
            js: Vec::new(),
            missing_js: Vec::new(),
        }
    }

    pub fn dep(mut self, name: &'static str, major: u32, minor: u32) -> Self {
        self.deps.push((name, major, minor));
        self
    }

    pub fn js(mut self, path: &'static str) -> Self {
        self.js.push(path);
        self
    }

    pub fn missing_js(mut self, path: &'static str) -> Self {
        self.missing_js.push(path);
        self
    }

    pub fn identifier(&self) -> LibraryIdentifier {
        LibraryIdentifier::new(self.name, self.major, self.minor)
    }

    fn manifest(&self) -> serde_json::Value {
        let deps: Vec<_> = self
            .deps
            .iter()
            .map(|(n, ma, mi)| {
                serde_json::json!({"machineName": n, "majorVersion": ma, "minorVersion": mi})
            })
            .collect();
        let js: Vec<_> = self
            .js
            .iter()
            .chain(self.missing_js.iter())
            .map(|p| serde_json::json!({ "path": p }))
            .collect();
        serde_json::json!({
            "title": self.name,
            "machineName": self.name,
            "majorVersion": self.major,
            "minorVersion": self.minor,
            "patchVersion": 3,
            "runnable": 1,
            "preloadedDependencies": deps,
            "preloadedJs": js,
        })
    }

    fn write_into(&self, writer: &mut zip::ZipWriter<Cursor<Vec<u8>>>, prefix: &str) {
        writer
            .start_file(format!("{}library.json", prefix), SimpleFileOptions::default())
            .unwrap();
        writer
            .write_all(self.manifest().to_string().as_bytes())
            .unwrap();
        for path in &self.js {
            writer
                .start_file(format!("{}{}", prefix, path), SimpleFileOptions::default())
                .unwrap();
            writer
                .write_all(format!("/* {} */", self.name).as_bytes())
                .unwrap();
        }
    }

    /// Zip with `library.json` and the declared scripts at the root
    pub fn archive(&self) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        self.write_into(&mut writer, "");
        writer.finish().unwrap().into_inner()
    }
}

/// Package-layout zip: `h5p.json` plus each library under `<name>-<maj>.<min>/`
pub fn package_archive(libs: &[Lib]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    writer
        .start_file("h5p.json", SimpleFileOptions::default())
        .unwrap();
    writer.write_all(b"{}").unwrap();
    for lib in libs {
        lib.write_into(&mut writer, &format!("{}/", lib.identifier().dir_name()));
    }
    writer.finish().unwrap().into_inner()
}

/// In-memory library source recording every fetch
#[derive(Default)]
pub struct MemorySource {
    archives: HashMap<String, Vec<u8>>,
    fetches: Mutex<Vec<String>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, lib: Lib) -> Self {
        self.archives.insert(lib.identifier().cache_key(), lib.archive());
        self
    }

    /// Serve arbitrary bytes for `key`
    pub fn with_raw(mut self, key: &str, bytes: Vec<u8>) -> Self {
        self.archives.insert(key.to_string(), bytes);
        self
    }

    pub fn fetches(&self) -> Vec<String> {
        self.fetches.lock().unwrap().clone()
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.lock().unwrap().len()
    }
}

#[async_trait]
impl LibrarySource for MemorySource {
    fn describe(&self, id: &LibraryIdentifier) -> String {
        format!("memory://{}", id.cache_key())
    }

    async fn fetch(&self, id: &LibraryIdentifier) -> Result<Vec<u8>> {
        let key = id.cache_key();
        self.fetches.lock().unwrap().push(key.clone());
        self.archives
            .get(&key)
            .cloned()
            .ok_or_else(|| CompileError::Fetch {
                library: id.clone(),
                url: self.describe(id),
                reason: "404 Not Found".to_string(),
                remediation: "Check the library name".to_string(),
            })
    }
}

/// The built-in handlers' libraries and a small shared dependency tree
pub fn standard_source() -> MemorySource {
    MemorySource::new()
        .with(Lib::new("FontAwesome", 4, 5).js("fa.js"))
        .with(Lib::new("H5P.JoubelUI", 1, 3).dep("FontAwesome", 4, 5).js("joubel.js"))
        .with(Lib::new("H5P.Question", 1, 5).dep("H5P.JoubelUI", 1, 3).js("question.js"))
        .with(Lib::new("H5P.Column", 1, 18).js("column.js"))
        .with(Lib::new("H5P.AdvancedText", 1, 1).js("text.js"))
        .with(Lib::new("H5P.Image", 1, 1).js("image.js"))
        .with(Lib::new("H5P.Audio", 1, 5).js("audio.js"))
        .with(
            Lib::new("H5P.MultiChoice", 1, 16)
                .dep("H5P.Question", 1, 5)
                .dep("H5P.JoubelUI", 1, 3)
                .js("multichoice.js"),
        )
        .with(
            Lib::new("H5P.TrueFalse", 1, 8)
                .dep("H5P.Question", 1, 5)
                .js("truefalse.js"),
        )
}

/// Generator that always fails and counts calls
#[derive(Default)]
pub struct FailingGenerator {
    pub calls: AtomicUsize,
}

#[async_trait]
impl Generator for FailingGenerator {
    fn name(&self) -> &str {
        "failing"
    }

    async fn generate(&self, _system_prompt: &str, _user_prompt: &str) -> anyhow::Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        anyhow::bail!("simulated outage")
    }
}

/// Store over a temp directory and the given source
pub fn store(temp: &TempDir, source: Arc<MemorySource>) -> Arc<LibraryStore> {
    Arc::new(LibraryStore::new(
        temp.path().join("libraries"),
        source as Arc<dyn LibrarySource>,
    ))
}

/// Compiler with the given registry, source and generator
pub fn compiler_with(
    temp: &TempDir,
    registry: HandlerRegistry,
    source: Arc<MemorySource>,
    generator: Arc<dyn Generator>,
) -> Compiler {
    Compiler::new(
        Arc::new(registry),
        LibraryResolver::new(store(temp, source)),
        generator,
    )
    .with_options(CompileOptions::default())
}

/// Compiler with the built-in handlers and a failing generator
pub fn compiler(temp: &TempDir, source: Arc<MemorySource>) -> Compiler {
    compiler_with(
        temp,
        HandlerRegistry::with_builtin_handlers().unwrap(),
        source,
        Arc::new(FailingGenerator::default()),
    )
}
