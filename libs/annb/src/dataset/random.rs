//! Fingerprinted synthetic corpus.

use std::collections::BTreeMap;
use std::path::Path;

use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::{info, warn};

use super::cached::write_canonical;
use super::{CachedDataset, Dataset, Fingerprint};
use crate::error::{Error, Result};
use crate::groundtruth::GroundTruthGenerator;
use crate::matrix::Matrix;
use crate::metric::MetricType;
use crate::store::AttrValue;

/// Uniform random vectors plus exact self-query ground truth, cached on disk
/// and keyed by a [`Fingerprint`].
///
/// A cache is reused only when its fingerprint matches exactly and its `done`
/// marker is set. Anything else regenerates the whole file.
#[derive(Debug)]
pub struct RandomDataset {
    inner: CachedDataset,
    generated: bool,
}

impl RandomDataset {
    pub fn open_or_generate(path: impl AsRef<Path>, fingerprint: Fingerprint, seed: u64) -> Result<Self> {
        Self::open_or_generate_with(path, fingerprint, seed, &GroundTruthGenerator::default())
    }

    pub fn open_or_generate_with(
        path: impl AsRef<Path>,
        fingerprint: Fingerprint,
        seed: u64,
        generator: &GroundTruthGenerator,
    ) -> Result<Self> {
        let path = path.as_ref();
        if fingerprint.dimension == 0 || fingerprint.count == 0 {
            return Err(Error::InvalidConfig(format!(
                "cannot generate an empty corpus {}",
                fingerprint
            )));
        }

        match Self::load_from_cache(path, &fingerprint) {
            Ok(inner) => {
                info!(path = %path.display(), %fingerprint, "Reusing cached dataset");
                return Ok(Self {
                    inner,
                    generated: false,
                });
            }
            Err(Error::NotFound { .. }) => {
                info!(path = %path.display(), %fingerprint, "No cached dataset, generating");
            }
            Err(e) if e.is_cache_miss() || matches!(e, Error::UnknownMetric(_)) => {
                warn!(path = %path.display(), error = %e, "Cached dataset unusable, regenerating");
            }
            Err(e) => return Err(e),
        }

        let inner = Self::generate(path, &fingerprint, seed, generator)?;
        Ok(Self {
            inner,
            generated: true,
        })
    }

    /// Open `path` and accept it only if it is complete and matches.
    pub fn load_from_cache(path: &Path, fingerprint: &Fingerprint) -> Result<CachedDataset> {
        let dataset = CachedDataset::open(path)?;
        let stored = dataset.fingerprint();
        if stored != *fingerprint {
            return Err(Error::cache_invalid(
                path,
                format!("fingerprint {} does not match requested {}", stored, fingerprint),
            ));
        }
        if !dataset.is_done() {
            return Err(Error::cache_invalid(path, "completion marker not set"));
        }
        Ok(dataset)
    }

    fn generate(
        path: &Path,
        fingerprint: &Fingerprint,
        seed: u64,
        generator: &GroundTruthGenerator,
    ) -> Result<CachedDataset> {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let values: Vec<f32> = (0..fingerprint.count * fingerprint.dimension)
            .map(|_| rng.gen::<f32>())
            .collect();
        let mut data = Matrix::from_vec(values, fingerprint.count, fingerprint.dimension)?;
        if fingerprint.normalize {
            data.normalize_rows();
        }

        let truth = generator.generate(&data, &data, fingerprint.metric)?;
        let query = data.head(truth.len());

        let mut attrs = BTreeMap::new();
        attrs.insert("normalize".to_string(), AttrValue::Bool(fingerprint.normalize));
        attrs.insert("normalized".to_string(), AttrValue::Bool(fingerprint.normalize));
        attrs.insert("seed".to_string(), AttrValue::Int(seed as i64));
        write_canonical(path, fingerprint.metric, &data, &query, &truth, attrs)?;
        info!(path = %path.display(), %fingerprint, "Generated dataset");

        CachedDataset::open(path)
    }

    /// Whether this instance generated the file rather than reusing it.
    pub fn was_generated(&self) -> bool {
        self.generated
    }

    pub fn cached(&self) -> &CachedDataset {
        &self.inner
    }

    pub fn into_cached(self) -> CachedDataset {
        self.inner
    }

    pub fn path(&self) -> &Path {
        self.inner.path()
    }
}

impl Dataset for RandomDataset {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn dimension(&self) -> usize {
        self.inner.dimension()
    }

    fn count(&self) -> usize {
        self.inner.count()
    }

    fn metric(&self) -> MetricType {
        self.inner.metric()
    }

    fn normalize(&self) -> bool {
        self.inner.normalize()
    }

    fn data(&self) -> Result<&Matrix<f32>> {
        self.inner.data()
    }

    fn query_data(&self) -> Result<&Matrix<f32>> {
        self.inner.query_data()
    }

    fn ground_truth(&self) -> Result<&Matrix<i64>> {
        self.inner.ground_truth()
    }

    fn truth_rows(&self) -> usize {
        self.inner.truth_rows()
    }

    fn truth_depth(&self) -> usize {
        self.inner.truth_depth()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::groundtruth::CpuBackend;
    use tempfile::TempDir;

    fn small() -> GroundTruthGenerator {
        GroundTruthGenerator::new(vec![Box::new(CpuBackend)]).with_depth(4)
    }

    #[test]
    fn test_generate_then_reuse() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("r.annb");
        let fp = Fingerprint::new(3, 50, MetricType::L2, false);

        let first = RandomDataset::open_or_generate_with(&path, fp, 1, &small()).unwrap();
        assert!(first.was_generated());
        assert_eq!(first.cached().fingerprint(), fp);
        let data = first.data().unwrap().clone();

        let second = RandomDataset::open_or_generate_with(&path, fp, 99, &small()).unwrap();
        assert!(!second.was_generated());
        assert_eq!(second.data().unwrap(), &data);
    }

    #[test]
    fn test_fingerprint_mismatch_regenerates() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("r.annb");
        let fp = Fingerprint::new(3, 50, MetricType::L2, false);
        RandomDataset::open_or_generate_with(&path, fp, 1, &small()).unwrap();

        let other = Fingerprint::new(3, 60, MetricType::L2, false);
        let ds = RandomDataset::open_or_generate_with(&path, other, 1, &small()).unwrap();
        assert!(ds.was_generated());
        assert_eq!(ds.count(), 60);
    }

    #[test]
    fn test_query_is_corpus_prefix() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("r.annb");
        let fp = Fingerprint::new(2, 30, MetricType::InnerProduct, true);
        let gen = small().with_max_queries(10);
        let ds = RandomDataset::open_or_generate_with(&path, fp, 5, &gen).unwrap();
        assert_eq!(ds.truth_rows(), 10);
        assert_eq!(ds.query_data().unwrap(), &ds.data().unwrap().head(10));
    }

    #[test]
    fn test_empty_corpus_rejected() {
        let dir = TempDir::new().unwrap();
        let fp = Fingerprint::new(0, 10, MetricType::L2, false);
        assert!(matches!(
            RandomDataset::open_or_generate_with(dir.path().join("x"), fp, 1, &small()),
            Err(Error::InvalidConfig(_))
        ));
    }
}
