//! Decoy Content
//!
//! Pool of plausible-looking files used as cover for sealed originals and as
//! honey files in protected folders. Content generation sits behind
//! [`DecoyGenerator`]; [`TemplateDecoyGenerator`] is the built-in one.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

const POOL_FILE_PREFIX: &str = "decoy_";

// ============================================================================
// KIND
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecoyKind {
    Script,
    Config,
    Text,
}

impl DecoyKind {
    pub const ALL: [DecoyKind; 3] = [DecoyKind::Script, DecoyKind::Config, DecoyKind::Text];

    /// Extension family of `path`
    pub fn for_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "py" | "js" | "ts" | "rs" | "go" | "java" | "c" | "cpp" | "h" | "cs" | "rb" | "php"
            | "sh" | "sql" => DecoyKind::Script,
            "json" | "yaml" | "yml" | "toml" | "env" | "ini" | "cfg" | "conf" | "xml" | "key"
            | "pem" => DecoyKind::Config,
            _ => DecoyKind::Text,
        }
    }

    /// Extension used for pool files of this kind
    pub fn extension(&self) -> &'static str {
        match self {
            DecoyKind::Script => "py",
            DecoyKind::Config => "json",
            DecoyKind::Text => "txt",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DecoyKind::Script => "script",
            DecoyKind::Config => "config",
            DecoyKind::Text => "text",
        }
    }
}

// ============================================================================
// GENERATOR
// ============================================================================

/// Produces decoy file content. Same `(kind, seed)` should give the same text.
pub trait DecoyGenerator: Send + Sync {
    fn generate(&self, kind: DecoyKind, seed: u64) -> String;
}

const SERVICES: &[&str] = &["billing", "inventory", "auth", "reporting", "payments", "archive"];
const HOSTS: &[&str] = &["db-prod-02", "cache-eu-1", "backup-nas", "api-gw-03", "ldap-int"];
const NOTES: &[&str] = &[
    "Rotate credentials before the quarterly audit.",
    "Old staging cluster is decommissioned, do not use.",
    "Migration window moved to Sunday 02:00 UTC.",
    "Ask ops for the new VPN profile.",
    "Backup restore test passed, see ticket history.",
];

/// Template-based generator: fixed skeletons filled with random values.
#[derive(Debug, Clone, Copy, Default)]
pub struct TemplateDecoyGenerator;

fn token(rng: &mut StdRng, len: usize) -> String {
    const CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
    (0..len)
        .map(|_| CHARSET[rng.gen_range(0..CHARSET.len())] as char)
        .collect()
}

fn pick<'a>(rng: &mut StdRng, items: &[&'a str]) -> &'a str {
    items[rng.gen_range(0..items.len())]
}

impl DecoyGenerator for TemplateDecoyGenerator {
    fn generate(&self, kind: DecoyKind, seed: u64) -> String {
        let mut rng = StdRng::seed_from_u64(seed);
        let service = pick(&mut rng, SERVICES);
        let host = pick(&mut rng, HOSTS);

        match kind {
            DecoyKind::Script => format!(
                "#!/usr/bin/env python3\n\
                 \"\"\"{service} maintenance helper.\"\"\"\n\n\
                 import os\n\n\
                 HOST = \"{host}.internal\"\n\
                 PORT = {port}\n\
                 TOKEN = os.environ.get(\"{upper}_TOKEN\", \"{token}\")\n\n\n\
                 def sync(batch_size={batch}):\n\
                 \x20   for offset in range(0, {limit}, batch_size):\n\
                 \x20       print(f\"sync {service} {{offset}}\")\n\n\n\
                 if __name__ == \"__main__\":\n\
                 \x20   sync()\n",
                service = service,
                host = host,
                port = rng.gen_range(1024..65535),
                upper = service.to_uppercase(),
                token = token(&mut rng, 32),
                batch = rng.gen_range(10..500),
                limit = rng.gen_range(1_000..100_000),
            ),
            DecoyKind::Config => format!(
                "{{\n  \"service\": \"{service}\",\n  \"host\": \"{host}.internal\",\n  \
                 \"port\": {port},\n  \"user\": \"svc_{service}\",\n  \"password\": \"{password}\",\n  \
                 \"api_key\": \"{api_key}\",\n  \"retries\": {retries}\n}}\n",
                service = service,
                host = host,
                port = rng.gen_range(1024..65535),
                password = token(&mut rng, 20),
                api_key = token(&mut rng, 40),
                retries = rng.gen_range(1..9),
            ),
            DecoyKind::Text => format!(
                "{service} notes\n\n- {note}\n- Jump host: {host}\n- Temp passphrase: {pass}\n",
                service = service,
                note = pick(&mut rng, NOTES),
                host = host,
                pass = token(&mut rng, 12),
            ),
        }
    }
}

/// VM-flavored decoy: a fake hypervisor settings file.
pub fn vm_settings(seed: u64) -> String {
    let mut rng = StdRng::seed_from_u64(seed);
    format!(
        ".encoding = \"UTF-8\"\n\
         config.version = \"8\"\n\
         virtualHW.version = \"19\"\n\
         displayName = \"{host}\"\n\
         memsize = \"{mem}\"\n\
         numvcpus = \"{cpus}\"\n\
         ethernet0.address = \"00:50:56:{a:02x}:{b:02x}:{c:02x}\"\n\
         uuid.bios = \"{uuid}\"\n",
        host = pick(&mut rng, HOSTS),
        mem = 1024 * rng.gen_range(2..32),
        cpus = rng.gen_range(1..16),
        a = rng.gen::<u8>() & 0x3f,
        b = rng.gen::<u8>(),
        c = rng.gen::<u8>(),
        uuid = token(&mut rng, 32),
    )
}

// ============================================================================
// POOL
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DecoyFile {
    pub path: PathBuf,
    pub kind: DecoyKind,
}

/// Materialized decoy files in the decoy directory.
pub struct DecoyPool {
    files: Vec<DecoyFile>,
    generator: Arc<dyn DecoyGenerator>,
    cursor: AtomicUsize,
}

fn pool_file_name(index: usize, kind: DecoyKind) -> String {
    format!("{}{:03}.{}", POOL_FILE_PREFIX, index, kind.extension())
}

impl DecoyPool {
    /// Ensure up to `size` pool files exist in `dir`, reusing existing ones.
    pub fn materialize(
        dir: &Path,
        size: usize,
        generator: Arc<dyn DecoyGenerator>,
    ) -> std::io::Result<Self> {
        fs::create_dir_all(dir)?;
        let mut files = Vec::with_capacity(size);
        let mut created = 0usize;

        for index in 0..size {
            let kind = DecoyKind::ALL[index % DecoyKind::ALL.len()];
            let path = dir.join(pool_file_name(index, kind));
            if !path.exists() {
                let seed = rand::random::<u64>();
                if let Err(e) = fs::write(&path, generator.generate(kind, seed)) {
                    log::warn!("[Vault] Failed to create decoy {:?}: {}", path, e);
                    continue;
                }
                created += 1;
            }
            files.push(DecoyFile { path, kind });
        }

        log::info!(
            "[Vault] Decoy pool ready: {} files ({} new)",
            files.len(),
            created
        );
        Ok(Self {
            files,
            generator,
            cursor: AtomicUsize::new(0),
        })
    }

    pub fn files(&self) -> &[DecoyFile] {
        &self.files
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn generator(&self) -> &Arc<dyn DecoyGenerator> {
        &self.generator
    }

    /// Cover content for a file of `kind`: next pool file of that family,
    /// freshly generated when the pool has none or it cannot be read.
    pub fn content_for(&self, kind: DecoyKind) -> Vec<u8> {
        let candidates: Vec<&DecoyFile> = self.files.iter().filter(|f| f.kind == kind).collect();
        if !candidates.is_empty() {
            let index = self.cursor.fetch_add(1, Ordering::Relaxed) % candidates.len();
            if let Ok(content) = fs::read(&candidates[index].path) {
                return content;
            }
        }
        self.fresh(kind)
    }

    /// Newly generated content, never taken from the pool
    pub fn fresh(&self, kind: DecoyKind) -> Vec<u8> {
        self.generator.generate(kind, rand::random()).into_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_kind_for_path() {
        assert_eq!(DecoyKind::for_path(Path::new("/x/a.py")), DecoyKind::Script);
        assert_eq!(DecoyKind::for_path(Path::new("/x/settings.YAML")), DecoyKind::Config);
        assert_eq!(DecoyKind::for_path(Path::new("/x/notes.txt")), DecoyKind::Text);
        assert_eq!(DecoyKind::for_path(Path::new("/x/Makefile")), DecoyKind::Text);
    }

    #[test]
    fn test_generator_is_deterministic_per_seed() {
        let g = TemplateDecoyGenerator;
        assert_eq!(g.generate(DecoyKind::Config, 7), g.generate(DecoyKind::Config, 7));
        assert_ne!(g.generate(DecoyKind::Config, 7), g.generate(DecoyKind::Config, 8));
        let config = g.generate(DecoyKind::Config, 1);
        assert!(serde_json::from_str::<serde_json::Value>(&config).is_ok());
    }

    #[test]
    fn test_pool_materializes_and_reuses() {
        let dir = TempDir::new().unwrap();
        let generator: Arc<dyn DecoyGenerator> = Arc::new(TemplateDecoyGenerator);

        let pool = DecoyPool::materialize(dir.path(), 6, Arc::clone(&generator)).unwrap();
        assert_eq!(pool.len(), 6);
        let first = fs::read(&pool.files()[0].path).unwrap();

        let again = DecoyPool::materialize(dir.path(), 6, generator).unwrap();
        assert_eq!(again.len(), 6);
        assert_eq!(fs::read(&again.files()[0].path).unwrap(), first);
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 6);
    }

    #[test]
    fn test_content_matches_family() {
        let dir = TempDir::new().unwrap();
        let pool = DecoyPool::materialize(dir.path(), 3, Arc::new(TemplateDecoyGenerator)).unwrap();
        let script = String::from_utf8(pool.content_for(DecoyKind::Script)).unwrap();
        assert!(script.starts_with("#!/usr/bin/env python3"));
    }

    #[test]
    fn test_empty_pool_falls_back_to_generator() {
        let dir = TempDir::new().unwrap();
        let pool = DecoyPool::materialize(dir.path(), 0, Arc::new(TemplateDecoyGenerator)).unwrap();
        assert!(pool.is_empty());
        assert!(!pool.content_for(DecoyKind::Text).is_empty());
    }
}
