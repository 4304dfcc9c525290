use super::{SeriesKey, SeriesSchema, SeriesStore, StructureReport};
use crate::error::{ImportError, ImportResult};
use crate::record::Metrics;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};


const EXTENSION: &str = "series";
const FORMAT_VERSION: u32 = 1;
const TAIL_CHUNK: usize = 4096;

#[derive(Debug, Serialize, Deserialize)]
struct Header {
    version: u32,
    source: String,
    port: u16,
    #[serde(flatten)]
    schema: SeriesSchema,
}

#[derive(Debug, Serialize, Deserialize)]
struct Sample {
    ts: i64,
    values: Vec<u64>,
}

/// Last non-blank line of `file` and the offset it starts at, read backwards in `chunk` steps.
fn last_line(file: &mut File, chunk: usize) -> io::Result<Option<(u64, String)>> {
    let mut pos = file.seek(SeekFrom::End(0))?;
    let mut tail: Vec<u8> = Vec::new();
    let mut buf = vec![0u8; chunk.max(1)];

    loop {
        let end = tail.iter().rposition(|b| !b.is_ascii_whitespace());
        if let Some(end) = end
            && let Some(newline) = tail[..end].iter().rposition(|&b| b == b'\n')
        {
            let line = String::from_utf8_lossy(&tail[newline + 1..=end]).into_owned();
            return Ok(Some((pos + newline as u64 + 1, line)));
        }
        if pos == 0 {
            return Ok(end.map(|end| (0, String::from_utf8_lossy(&tail[..=end]).into_owned())));
        }

        let step = buf.len().min(pos as usize);
        pos -= step as u64;
        file.seek(SeekFrom::Start(pos))?;
        file.read_exact(&mut buf[..step])?;
        tail.splice(0..0, buf[..step].iter().copied());
    }
}

/// One append-only file per series: a JSON header line followed by one JSON sample per line.
#[derive(Debug)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn open(root: impl Into<PathBuf>) -> ImportResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|source| ImportError::StoreUnreachable {
            path: root.clone(),
            source,
        })?;
        debug!(root = ?root, "Opened file store");
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn series_path(&self, key: &SeriesKey) -> PathBuf {
        self.root.join(format!("{}.{}", key.file_stem(), EXTENSION))
    }

    fn unreachable(&self, path: &Path, source: io::Error) -> ImportError {
        ImportError::StoreUnreachable {
            path: path.to_path_buf(),
            source,
        }
    }

    fn read_header_at(&self, path: &Path) -> ImportResult<Option<Result<Header, serde_json::Error>>> {
        let file = match File::open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(self.unreachable(path, e)),
        };
        let mut line = String::new();
        BufReader::new(file)
            .read_line(&mut line)
            .map_err(|e| self.unreachable(path, e))?;
        Ok(Some(serde_json::from_str(line.trim())))
    }

    fn read_header(&self, key: &SeriesKey) -> ImportResult<Option<Header>> {
        match self.read_header_at(&self.series_path(key))? {
            None => Ok(None),
            Some(Ok(header)) => Ok(Some(header)),
            Some(Err(e)) => Err(ImportError::CorruptSeries {
                key: key.clone(),
                message: format!("bad header: {e}"),
            }),
        }
    }

    /// Timestamp of the newest sample in an already opened series file.
    fn last_sample(&self, key: &SeriesKey, file: &mut File) -> ImportResult<Option<i64>> {
        let path = self.series_path(key);
        let tail = last_line(file, TAIL_CHUNK).map_err(|e| self.unreachable(&path, e))?;
        match tail {
            // an empty file or one holding only the header
            None | Some((0, _)) => Ok(None),
            Some((_, line)) => {
                let sample: Sample =
                    serde_json::from_str(&line).map_err(|e| ImportError::CorruptSeries {
                        key: key.clone(),
                        message: format!("bad sample: {e}"),
                    })?;
                Ok(Some(sample.ts))
            }
        }
    }
}

impl SeriesStore for FileStore {
    fn last_update(&self, key: &SeriesKey) -> ImportResult<Option<i64>> {
        let path = self.series_path(key);
        let mut file = match File::open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(self.unreachable(&path, e)),
        };
        self.last_sample(key, &mut file)
    }

    fn exists(&self, key: &SeriesKey) -> ImportResult<bool> {
        let path = self.series_path(key);
        match fs::metadata(&path) {
            Ok(meta) => Ok(meta.is_file()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(self.unreachable(&path, e)),
        }
    }

    fn create(&mut self, key: &SeriesKey, schema: &SeriesSchema) -> ImportResult<bool> {
        let path = self.series_path(key);
        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => return Ok(false),
            Err(e) => return Err(ImportError::io(&path, e)),
        };

        let header = Header {
            version: FORMAT_VERSION,
            source: key.source.clone(),
            port: key.port,
            schema: schema.clone(),
        };
        let line = serde_json::to_string(&header).map_err(|e| ImportError::CorruptSeries {
            key: key.clone(),
            message: e.to_string(),
        })?;
        writeln!(file, "{line}").map_err(|e| ImportError::io(&path, e))?;
        info!(series = %key, path = ?path, step = schema.step_seconds, "Created series");
        Ok(true)
    }

    fn append(&mut self, key: &SeriesKey, timestamp: i64, metrics: &Metrics) -> ImportResult<()> {
        let path = self.series_path(key);
        let mut file = match OpenOptions::new().read(true).append(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(ImportError::MissingSeries(key.clone()));
            }
            Err(e) => return Err(self.unreachable(&path, e)),
        };

        if let Some(last) = self.last_sample(key, &mut file)?
            && timestamp <= last
        {
            return Err(ImportError::StaleWrite {
                key: key.clone(),
                timestamp,
                last,
            });
        }

        let sample = Sample {
            ts: timestamp,
            values: metrics.values().to_vec(),
        };
        let line = serde_json::to_string(&sample).map_err(|e| ImportError::CorruptSeries {
            key: key.clone(),
            message: e.to_string(),
        })?;
        writeln!(file, "{line}").map_err(|e| ImportError::io(&path, e))?;
        Ok(())
    }

    fn validate_structure(
        &self,
        key: &SeriesKey,
        expected: &SeriesSchema,
    ) -> ImportResult<StructureReport> {
        let Some(header) = self.read_header(key)? else {
            return Ok(StructureReport::valid(format!("series {key} does not exist yet")));
        };
        if header.version != FORMAT_VERSION {
            return Ok(StructureReport::invalid(format!(
                "format version {}, expected {}",
                header.version, FORMAT_VERSION
            )));
        }
        let stored = SeriesKey::new(header.source, header.port);
        if &stored != key {
            return Ok(StructureReport::invalid(format!("file holds series {stored}")));
        }
        Ok(StructureReport::compare(expected, &header.schema))
    }

    fn reset(&mut self) -> ImportResult<usize> {
        let entries = fs::read_dir(&self.root).map_err(|e| self.unreachable(&self.root, e))?;
        let mut removed = 0;
        for entry in entries {
            let entry = entry.map_err(|e| self.unreachable(&self.root, e))?;
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == EXTENSION) && path.is_file() {
                fs::remove_file(&path).map_err(|e| ImportError::io(&path, e))?;
                removed += 1;
            }
        }
        info!(root = ?self.root, removed, "Reset file store");
        Ok(removed)
    }

    fn list(&self) -> ImportResult<Vec<SeriesKey>> {
        let entries = fs::read_dir(&self.root).map_err(|e| self.unreachable(&self.root, e))?;
        let mut keys = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| self.unreachable(&self.root, e))?;
            let path = entry.path();
            if !path.extension().is_some_and(|ext| ext == EXTENSION) || !path.is_file() {
                continue;
            }
            match self.read_header_at(&path)? {
                Some(Ok(header)) => keys.push(SeriesKey::new(header.source, header.port)),
                Some(Err(e)) => warn!(path = ?path, error = %e, "Skipping series with unreadable header"),
                None => {}
            }
        }
        keys.sort();
        Ok(keys)
    }
}
