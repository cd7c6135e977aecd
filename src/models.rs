//! Model artifact loading.
//!
//! The four weight files are fetched one after another in a fixed order,
//! with one progress message per artifact emitted before it is fetched.

use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use std::io::Read;
use std::path::{Path, PathBuf};

use crate::config::ModelsConfig;
use crate::error::LoadError;

/// One of the four weight sets the detector needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelArtifact {
    Detector,
    Landmarks,
    Recognition,
    Expressions,
}

impl ModelArtifact {
    /// Load order.
    pub const ALL: [ModelArtifact; 4] = [
        ModelArtifact::Detector,
        ModelArtifact::Landmarks,
        ModelArtifact::Recognition,
        ModelArtifact::Expressions,
    ];

    /// Key used in configuration tables.
    pub fn key(&self) -> &'static str {
        match self {
            ModelArtifact::Detector => "detector",
            ModelArtifact::Landmarks => "landmarks",
            ModelArtifact::Recognition => "recognition",
            ModelArtifact::Expressions => "expressions",
        }
    }

    /// Cache file name; matches the published file.
    pub fn file_name(&self) -> &'static str {
        match self {
            ModelArtifact::Detector => "version-RFB-320.onnx",
            ModelArtifact::Landmarks => "face_landmarks.onnx",
            ModelArtifact::Recognition => "arcfaceresnet100-11-int8.onnx",
            ModelArtifact::Expressions => "emotion-ferplus-8.onnx",
        }
    }

    /// Published location of the weights.
    pub fn default_url(&self) -> &'static str {
        match self {
            ModelArtifact::Detector => {
                "https://github.com/onnx/models/raw/main/validated/vision/body_analysis/ultraface/models/version-RFB-320.onnx"
            }
            ModelArtifact::Landmarks => {
                "https://github.com/yinguobing/head-pose-estimation/releases/download/v3.0.0/face_landmarks.onnx"
            }
            ModelArtifact::Recognition => {
                "https://github.com/onnx/models/raw/main/validated/vision/body_analysis/arcface/model/arcfaceresnet100-11-int8.onnx"
            }
            ModelArtifact::Expressions => {
                "https://github.com/onnx/models/raw/main/validated/vision/body_analysis/emotion_ferplus/model/emotion-ferplus-8.onnx"
            }
        }
    }

    fn index(&self) -> usize {
        match self {
            ModelArtifact::Detector => 0,
            ModelArtifact::Landmarks => 1,
            ModelArtifact::Recognition => 2,
            ModelArtifact::Expressions => 3,
        }
    }

    /// Status line shown while this artifact loads.
    pub fn progress_message(&self) -> &'static str {
        match self {
            ModelArtifact::Detector => "Loading Face Detector...",
            ModelArtifact::Landmarks => "Loading Face Landmarks...",
            ModelArtifact::Recognition => "Loading Face Recognition...",
            ModelArtifact::Expressions => "Loading Face Expressions...",
        }
    }
}

impl fmt::Display for ModelArtifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Progress report from [`ModelLoader::load`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadProgress {
    pub artifact: ModelArtifact,
    /// 1-based position in the load order.
    pub index: usize,
    pub total: usize,
}

impl LoadProgress {
    pub fn message(&self) -> &'static str {
        self.artifact.progress_message()
    }

    /// `step/total` counter shown next to the message.
    pub fn step(&self) -> String {
        format!("{}/{}", self.index, self.total)
    }
}

/// Where artifacts come from.
pub trait ArtifactSource: Send {
    /// Makes the artifact available locally and returns its path.
    fn fetch(&self, artifact: ModelArtifact) -> Result<PathBuf, LoadError>;
}

/// Local paths of a complete, verified model set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSet {
    paths: [PathBuf; 4],
}

impl ModelSet {
    pub fn path(&self, artifact: ModelArtifact) -> &Path {
        &self.paths[artifact.index()]
    }
}

/// Loads all artifacts once. `load` consumes the loader, so a model set can
/// be produced at most one time per loader.
pub struct ModelLoader<S> {
    source: S,
}

impl<S: ArtifactSource> ModelLoader<S> {
    pub fn new(source: S) -> Self {
        Self { source }
    }

    pub fn load<F>(self, mut on_progress: F) -> Result<ModelSet, LoadError>
    where
        F: FnMut(LoadProgress),
    {
        let total = ModelArtifact::ALL.len();
        let mut paths: [PathBuf; 4] = Default::default();

        for (i, artifact) in ModelArtifact::ALL.iter().copied().enumerate() {
            on_progress(LoadProgress {
                artifact,
                index: i + 1,
                total,
            });

            let path = self.source.fetch(artifact).map_err(|e| {
                tracing::error!(%artifact, error = %e, "Model artifact failed to load");
                e
            })?;
            tracing::debug!(%artifact, path = ?path, "Model artifact ready");
            paths[artifact.index()] = path;
        }

        tracing::info!("All model artifacts loaded");
        Ok(ModelSet { paths })
    }
}

/// Fetches artifacts over HTTP into a local cache directory.
pub struct HttpArtifactSource {
    urls: BTreeMap<String, String>,
    cache_dir: PathBuf,
    digests: BTreeMap<String, String>,
}

impl HttpArtifactSource {
    pub fn new(config: &ModelsConfig) -> Self {
        Self {
            urls: config.urls.clone(),
            cache_dir: config.dir.clone(),
            digests: config.sha256.clone(),
        }
    }

    /// The configured override, else the published location.
    pub fn url_for(&self, artifact: ModelArtifact) -> &str {
        self.urls
            .get(artifact.key())
            .map(String::as_str)
            .unwrap_or_else(|| artifact.default_url())
    }

    fn verify(&self, artifact: ModelArtifact, path: &Path) -> Result<(), LoadError> {
        match self.digests.get(artifact.key()) {
            Some(expected) => verify_digest(artifact, path, expected),
            None => Ok(()),
        }
    }

    fn download(&self, artifact: ModelArtifact, target: &Path) -> Result<(), LoadError> {
        let url = self.url_for(artifact);
        tracing::info!(model = %artifact, url = %url, "Downloading model...");

        let response = ureq::get(url).call().map_err(|e| LoadError::Fetch {
            artifact,
            url: url.to_string(),
            message: e.to_string(),
        })?;

        self.install(artifact, &mut response.into_reader(), target)?;
        tracing::info!(model = %artifact, path = ?target, "Model downloaded");
        Ok(())
    }

    /// Streams `reader` into a sibling `.part` file and renames it onto
    /// `target` only once the digest (if configured) matches.
    fn install(&self, artifact: ModelArtifact, reader: &mut dyn Read, target: &Path) -> Result<(), LoadError> {
        let partial = target.with_extension("part");
        let io_err = |path: &Path| {
            let path = path.to_path_buf();
            move |source| LoadError::Io { path, source }
        };

        let mut file = std::fs::File::create(&partial).map_err(io_err(&partial))?;
        if let Err(e) = std::io::copy(reader, &mut file) {
            drop(file);
            let _ = std::fs::remove_file(&partial);
            return Err(io_err(&partial)(e));
        }
        drop(file);

        if let Err(e) = self.verify(artifact, &partial) {
            let _ = std::fs::remove_file(&partial);
            return Err(e);
        }

        std::fs::rename(&partial, target).map_err(io_err(target))
    }
}

impl ArtifactSource for HttpArtifactSource {
    fn fetch(&self, artifact: ModelArtifact) -> Result<PathBuf, LoadError> {
        std::fs::create_dir_all(&self.cache_dir).map_err(|source| LoadError::Io {
            path: self.cache_dir.clone(),
            source,
        })?;

        let path = self.cache_dir.join(artifact.file_name());
        if path.exists() {
            match self.verify(artifact, &path) {
                Ok(()) => return Ok(path),
                Err(e) => {
                    tracing::warn!(model = %artifact, error = %e, "Cached model is corrupt, fetching again");
                    std::fs::remove_file(&path).map_err(|source| LoadError::Io {
                        path: path.clone(),
                        source,
                    })?;
                }
            }
        }

        self.download(artifact, &path)?;
        Ok(path)
    }
}

/// Compares the file's SHA-256 with a hex digest (case-insensitive).
pub fn verify_digest(artifact: ModelArtifact, path: &Path, expected: &str) -> Result<(), LoadError> {
    let io_err = |source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    };

    let mut file = std::fs::File::open(path).map_err(io_err)?;
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buffer).map_err(io_err)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }

    let actual: String = hasher
        .finalize()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect();

    if actual.eq_ignore_ascii_case(expected.trim()) {
        Ok(())
    } else {
        Err(LoadError::DigestMismatch {
            artifact,
            expected: expected.to_string(),
            actual,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Serves artifacts from a directory, failing at a chosen index.
    struct FakeSource {
        dir: PathBuf,
        fail_at: Option<usize>,
        fetches: Arc<AtomicUsize>,
    }

    impl ArtifactSource for FakeSource {
        fn fetch(&self, artifact: ModelArtifact) -> Result<PathBuf, LoadError> {
            let n = self.fetches.fetch_add(1, Ordering::SeqCst);
            if Some(n) == self.fail_at {
                return Err(LoadError::Fetch {
                    artifact,
                    url: "test://".to_string(),
                    message: "offline".to_string(),
                });
            }
            Ok(self.dir.join(artifact.file_name()))
        }
    }

    fn fake(fail_at: Option<usize>) -> (FakeSource, Arc<AtomicUsize>) {
        let fetches = Arc::new(AtomicUsize::new(0));
        (
            FakeSource {
                dir: PathBuf::from("/models"),
                fail_at,
                fetches: fetches.clone(),
            },
            fetches,
        )
    }

    #[test]
    fn test_reports_four_messages_in_order() {
        let (source, _) = fake(None);
        let mut messages = Vec::new();
        let set = ModelLoader::new(source)
            .load(|p| messages.push(p.message()))
            .unwrap();

        assert_eq!(
            messages,
            vec![
                "Loading Face Detector...",
                "Loading Face Landmarks...",
                "Loading Face Recognition...",
                "Loading Face Expressions...",
            ]
        );
        for artifact in ModelArtifact::ALL {
            assert_eq!(set.path(artifact), Path::new("/models").join(artifact.file_name()));
        }
    }

    #[test]
    fn test_failure_stops_progress() {
        for k in 0..4 {
            let (source, fetches) = fake(Some(k));
            let mut progress = Vec::new();
            let result = ModelLoader::new(source).load(|p| progress.push(p));

            assert!(result.is_err());
            assert_eq!(progress.len(), k + 1);
            assert_eq!(progress.last().unwrap().artifact, ModelArtifact::ALL[k]);
            assert_eq!(fetches.load(Ordering::SeqCst), k + 1);
        }
    }

    fn offline_source(dir: &Path, digests: &[(&str, &str)]) -> HttpArtifactSource {
        let mut config = ModelsConfig {
            urls: BTreeMap::new(),
            dir: dir.to_path_buf(),
            sha256: digests
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        };
        // Unroutable; any network access fails fast.
        for artifact in ModelArtifact::ALL {
            config
                .urls
                .insert(artifact.key().to_string(), format!("http://127.0.0.1:9/{}", artifact.file_name()));
        }
        HttpArtifactSource::new(&config)
    }

    // sha256("abc")
    const ABC_DIGEST: &str = "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad";

    #[test]
    fn test_each_artifact_has_its_own_url() {
        let source = HttpArtifactSource::new(&ModelsConfig::default());
        let urls: Vec<&str> = ModelArtifact::ALL.iter().map(|a| source.url_for(*a)).collect();

        for (artifact, url) in ModelArtifact::ALL.iter().zip(&urls) {
            assert_eq!(*url, artifact.default_url());
            assert!(url.starts_with("https://"));
            assert!(url.ends_with(artifact.file_name()));
        }
        let mut unique = urls.clone();
        unique.sort();
        unique.dedup();
        assert_eq!(unique.len(), 4);
    }

    #[test]
    fn test_url_override_applies_to_one_artifact() {
        let mut config = ModelsConfig::default();
        config
            .urls
            .insert("landmarks".to_string(), "https://mirror.example/lm.onnx".to_string());
        let source = HttpArtifactSource::new(&config);

        assert_eq!(source.url_for(ModelArtifact::Landmarks), "https://mirror.example/lm.onnx");
        assert_eq!(
            source.url_for(ModelArtifact::Detector),
            ModelArtifact::Detector.default_url()
        );
    }

    #[test]
    fn test_cached_artifact_is_not_refetched() {
        let dir = tempfile::tempdir().unwrap();
        for artifact in ModelArtifact::ALL {
            std::fs::write(dir.path().join(artifact.file_name()), b"abc").unwrap();
        }

        let source = offline_source(dir.path(), &[("landmarks", ABC_DIGEST)]);
        let path = source.fetch(ModelArtifact::Landmarks).unwrap();
        assert_eq!(path, dir.path().join("face_landmarks.onnx"));
    }

    #[test]
    fn test_missing_artifact_fails_to_fetch() {
        let dir = tempfile::tempdir().unwrap();
        let source = offline_source(dir.path(), &[]);
        let err = source.fetch(ModelArtifact::Detector).unwrap_err();
        assert!(matches!(err, LoadError::Fetch { artifact: ModelArtifact::Detector, .. }));
        assert!(!dir.path().join("version-RFB-320.onnx").exists());
    }

    #[test]
    fn test_corrupt_cache_entry_is_evicted() {
        let dir = tempfile::tempdir().unwrap();
        let cached = dir.path().join(ModelArtifact::Detector.file_name());
        std::fs::write(&cached, b"corrupt").unwrap();

        let source = offline_source(dir.path(), &[("detector", ABC_DIGEST)]);
        let err = source.fetch(ModelArtifact::Detector).unwrap_err();

        // The bad file is gone and a fresh download was attempted
        assert!(matches!(err, LoadError::Fetch { .. }));
        assert!(!cached.exists());
    }

    #[test]
    fn test_install_rejects_bad_digest() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join(ModelArtifact::Expressions.file_name());
        let source = offline_source(dir.path(), &[("expressions", ABC_DIGEST)]);

        let err = source
            .install(ModelArtifact::Expressions, &mut std::io::Cursor::new(b"tampered".to_vec()), &target)
            .unwrap_err();
        assert!(matches!(err, LoadError::DigestMismatch { .. }));
        assert!(!target.exists());
        assert!(!target.with_extension("part").exists());

        source
            .install(ModelArtifact::Expressions, &mut std::io::Cursor::new(b"abc".to_vec()), &target)
            .unwrap();
        assert_eq!(std::fs::read(&target).unwrap(), b"abc");
        assert!(!target.with_extension("part").exists());
    }

    #[test]
    fn test_verify_digest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.onnx");
        std::fs::write(&path, b"abc").unwrap();

        let good = "BA7816BF8F01CFEA414140DE5DAE2223B00361A396177A9CB410FF61F20015AD";
        assert!(verify_digest(ModelArtifact::Detector, &path, good).is_ok());

        let err = verify_digest(ModelArtifact::Detector, &path, "00").unwrap_err();
        assert!(matches!(err, LoadError::DigestMismatch { .. }));
    }
}
