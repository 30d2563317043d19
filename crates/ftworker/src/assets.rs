//! Asset Manager (SPEC_FULL.md §4.G). Grounded on `client.py`'s
//! `download_needed_file`/`scan_existing_files`/`merge_partial_file` and
//! `util/client_helper.py`'s `download_file_with_trail`; the
//! oversize-splitting helper is grounded on `split_big_files.py`.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use log::{info, warn};
use rand::Rng;
use walkdir::WalkDir;

use crate::task::Task;

/// Below this size a downloaded engine/weight file is assumed to be an
/// error page (webdrive quota exceeded), matching `client.py`'s
/// `os.path.getsize(...) < 1024 * 100` check.
const MIN_VALID_SIZE: u64 = 1024 * 100;
const SPLIT_CHUNK_SIZE: u64 = 25 * 1024 * 1024;
const DOWNLOAD_RETRY_COUNT: u32 = 3;

/// Tracks which files already live under `files_root`, content-addressed
/// by the trailing id in their source URL, mirroring
/// `client.py`'s module-level `downloaded_file_list`.
pub struct AssetStore {
    files_root: PathBuf,
    downloaded: Vec<String>,
}

impl AssetStore {
    pub fn new(files_root: PathBuf) -> Self {
        Self { files_root, downloaded: Vec::new() }
    }

    /// Boot-time scan: merges any leftover `.partial` chunks from an
    /// interrupted prior run, then records files already present and large
    /// enough to be considered valid. Matches `merge_partial_file` +
    /// `scan_existing_files`.
    pub fn scan_existing(&mut self) -> Result<()> {
        self.merge_partials()?;
        fs::create_dir_all(&self.files_root)?;
        for entry in fs::read_dir(&self.files_root)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            let meta = entry.metadata()?;
            if meta.len() > MIN_VALID_SIZE && !self.downloaded.contains(&name) {
                self.downloaded.push(name);
            }
        }
        Ok(())
    }

    fn merge_partials(&self) -> Result<()> {
        let mut merged = Vec::new();
        for entry in WalkDir::new(&self.files_root).max_depth(1).into_iter().filter_map(|e| e.ok()) {
            let name = entry.file_name().to_string_lossy().into_owned();
            if !name.ends_with(".partial") {
                continue;
            }
            let segments: Vec<&str> = name.split('.').collect();
            if segments.len() < 3 {
                continue;
            }
            let file_name = segments[..segments.len() - 2].join(".");
            if merged.contains(&file_name) {
                continue;
            }
            let mut parts = Vec::new();
            let mut i = 1;
            loop {
                let part_path = self.files_root.join(format!("{file_name}.{i}.partial"));
                if part_path.exists() {
                    parts.push(part_path);
                    i += 1;
                } else {
                    break;
                }
            }
            let merged_path = self.files_root.join(&file_name);
            let mut out = fs::File::create(&merged_path)?;
            for part in &parts {
                let data = fs::read(part)?;
                out.write_all(&data)?;
                fs::remove_file(part)?;
            }
            merged.push(file_name);
        }
        Ok(())
    }

    /// File id embedded in an engine/weight URL: the last `_`-delimited
    /// segment of the final path component, stripped of its extension,
    /// matching `task['engine_url'].split("/")[-1].split(".")[0].split("_")[-1]`.
    pub fn file_id(url: &str) -> Option<String> {
        let last = url.rsplit('/').next()?;
        let stem = last.split('.').next()?;
        let id = stem.rsplit('_').next()?;
        Some(id.trim_matches('_').to_string())
    }

    pub fn is_downloaded(&self, name: &str) -> bool {
        self.downloaded.contains(&name.to_string())
    }

    /// `true` iff every non-empty URL on `task` already maps to a local
    /// file, matching `client.py`'s implicit "nothing left to download"
    /// admission check (SPEC_FULL.md §4.G "preferred pick").
    pub fn is_preferred_pick(&self, task: &Task) -> bool {
        let engine_ready = |url: &str| {
            url.is_empty() || AssetStore::file_id(url).is_some_and(|id| self.is_downloaded(&format!("engine_{id}")))
        };
        let weight_ready = |url: &Option<String>| match url.as_deref() {
            None | Some("") => true,
            Some(u) => AssetStore::file_id(u).is_some_and(|id| self.is_downloaded(&format!("xiangqi-{id}.nnue"))),
        };
        engine_ready(&task.engine_url)
            && engine_ready(&task.baseline_engine_url)
            && weight_ready(&task.weight_url)
            && weight_ready(&task.baseline_weight_url)
    }

    fn mark_downloaded(&mut self, name: &str) {
        if !self.downloaded.contains(&name.to_string()) {
            self.downloaded.push(name.to_string());
        }
    }

    /// Downloads `url` into `files_root/name` through one of `webdrive`
    /// mirrors (randomly chosen starting point, round-robin on failure),
    /// atomically via a temp file, rejecting undersized replies as quota
    /// exhaustion. Matches `download_needed_file` + `download_file_with_trail`.
    pub fn ensure_downloaded(&mut self, http: &reqwest::blocking::Client, url: &str, name: &str, webdrives: &[String]) -> Result<PathBuf> {
        let dest = self.files_root.join(name);
        if self.is_downloaded(name) && dest.exists() {
            return Ok(dest);
        }
        fs::create_dir_all(&self.files_root)?;
        let bytes = download_with_trail(http, url, webdrives)?;
        if (bytes.len() as u64) < MIN_VALID_SIZE {
            anyhow::bail!("downloaded file {name} is suspiciously small ({} bytes); webdrive quota likely exceeded", bytes.len());
        }
        let mut tmp = tempfile::NamedTempFile::new_in(&self.files_root)?;
        tmp.write_all(&bytes)?;
        tmp.persist(&dest).map_err(|e| e.error)?;
        self.mark_downloaded(name);
        Ok(dest)
    }

    /// Produces a UPX-compressed copy of `engine_path` the first time it is
    /// seen, shelling out to the `upx` binary at a random compression
    /// level, matching `download_needed_file`'s `os.system(f"./upx -{level}
    /// ...")`. No ecosystem crate wraps UPX; this is the one legitimate
    /// `Command` invocation in the crate.
    pub fn ensure_upx_compressed(&self, engine_path: &Path) -> Result<Option<PathBuf>> {
        let upx_path = PathBuf::from(format!("{}_upx", engine_path.display()));
        if upx_path.exists() || !engine_path.exists() {
            return Ok(if upx_path.exists() { Some(upx_path) } else { None });
        }
        let level = rand::rng().random_range(1..=9);
        info!("upx compressing {} at level {level}", engine_path.display());
        let status = std::process::Command::new("upx")
            .arg(format!("-{level}"))
            .arg("-o")
            .arg(&upx_path)
            .arg(engine_path)
            .status();
        match status {
            Ok(s) if s.success() => Ok(Some(upx_path)),
            Ok(s) => {
                warn!("upx exited with {s} for {}", engine_path.display());
                Ok(None)
            }
            Err(e) => {
                warn!("upx invocation failed for {}: {e}", engine_path.display());
                Ok(None)
            }
        }
    }

    /// Splits any file over `max_bytes` into `name.<i>.partial` chunks,
    /// grounded on `split_big_files.py`.
    pub fn split_if_large(path: &Path, max_bytes: u64) -> Result<Vec<PathBuf>> {
        let meta = fs::metadata(path).with_context(|| format!("stat {}", path.display()))?;
        if meta.len() <= max_bytes {
            return Ok(Vec::new());
        }
        let data = fs::read(path)?;
        let mut chunks = Vec::new();
        for (i, chunk) in data.chunks(max_bytes as usize).enumerate() {
            let chunk_path = PathBuf::from(format!("{}.{}.partial", path.display(), i + 1));
            fs::write(&chunk_path, chunk)?;
            chunks.push(chunk_path);
        }
        Ok(chunks)
    }
}

fn download_with_trail(http: &reqwest::blocking::Client, url: &str, webdrives: &[String]) -> Result<Vec<u8>> {
    if webdrives.is_empty() {
        return download_once(http, url);
    }
    let mut index = rand::rng().random_range(0..webdrives.len());
    for attempt in 0..DOWNLOAD_RETRY_COUNT {
        let full_url = format!("{}{}", webdrives[index], url);
        match download_once(http, &full_url) {
            Ok(bytes) => return Ok(bytes),
            Err(e) => warn!("download attempt {attempt} via mirror {} failed: {e}", webdrives[index]),
        }
        index = (index + 1) % webdrives.len();
        std::thread::sleep(Duration::from_secs(1));
    }
    anyhow::bail!("all {DOWNLOAD_RETRY_COUNT} webdrive attempts failed for {url}")
}

fn download_once(http: &reqwest::blocking::Client, url: &str) -> Result<Vec<u8>> {
    let resp = http.get(url).send()?;
    if !resp.status().is_success() {
        anyhow::bail!("download of {url} returned status {}", resp.status());
    }
    Ok(resp.bytes()?.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_file_id_from_url() {
        assert_eq!(AssetStore::file_id("http://host/dl/engine_uob7yg.exe").as_deref(), Some("uob7yg"));
        assert_eq!(AssetStore::file_id("http://host/dl/xiangqi-weight_8wi6br.nnue").as_deref(), Some("8wi6br"));
    }

    #[test]
    fn splits_only_when_over_threshold() {
        let dir = tempfile::tempdir().unwrap();
        let small = dir.path().join("small.bin");
        fs::write(&small, vec![0u8; 16]).unwrap();
        assert!(AssetStore::split_if_large(&small, 1024).unwrap().is_empty());

        let big = dir.path().join("big.bin");
        fs::write(&big, vec![0u8; 30]).unwrap();
        let chunks = AssetStore::split_if_large(&big, 10).unwrap();
        assert_eq!(chunks.len(), 3);
        assert!(chunks[0].to_string_lossy().ends_with(".1.partial"));
    }

    #[test]
    fn merges_partial_chunks_on_scan() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("engine_x.1.partial"), b"abc").unwrap();
        fs::write(dir.path().join("engine_x.2.partial"), b"def").unwrap();
        let mut store = AssetStore::new(dir.path().to_path_buf());
        store.scan_existing().unwrap();
        let merged = fs::read(dir.path().join("engine_x")).unwrap();
        assert_eq!(merged, b"abcdef");
        assert!(!dir.path().join("engine_x.1.partial").exists());
    }
}
