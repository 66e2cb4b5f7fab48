// Shard files: delimited lines, one file per key prefix, written as
// per-writer fragments `<stem>#<writer>` and merged into `<stem>`.

use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use log::{trace, warn};

use crate::error::Result;
use crate::types::{HashbandRow, WindowIndex};

pub const FRAGMENT_SEPARATOR: char = '#';

/// A record stored as one tab-separated line.
pub trait ShardRecord: Ord + Sized {
    fn to_line(&self) -> String;
    fn from_line(line: &str) -> Option<Self>;

    /// Whether two sorted neighbours describe the same row.
    fn same_key(&self, other: &Self) -> bool {
        self == other
    }
}

impl ShardRecord for HashbandRow {
    fn to_line(&self) -> String {
        format!("{}\t{}\t{}", self.band, self.doc_id, self.window)
    }

    fn from_line(line: &str) -> Option<Self> {
        let mut fields = line.split('\t');
        let band = fields.next()?.to_string();
        let doc_id = fields.next()?.parse().ok()?;
        let window = fields.next()?.parse().ok()?;
        if band.is_empty() || fields.next().is_some() {
            return None;
        }
        Some(HashbandRow { band, doc_id, window })
    }
}

/// A candidate within one document-pair file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct CandidateLine {
    pub window_a: WindowIndex,
    pub window_b: WindowIndex,
}

impl ShardRecord for CandidateLine {
    fn to_line(&self) -> String {
        format!("{}\t{}", self.window_a, self.window_b)
    }

    fn from_line(line: &str) -> Option<Self> {
        let (a, b) = line.split_once('\t')?;
        Some(CandidateLine { window_a: a.parse().ok()?, window_b: b.parse().ok()? })
    }
}

/// A validated match within one document-pair file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct MatchLine {
    pub window_a: WindowIndex,
    pub window_b: WindowIndex,
    pub similarity: u8,
}

impl ShardRecord for MatchLine {
    fn to_line(&self) -> String {
        format!("{}\t{}\t{}", self.window_a, self.window_b, self.similarity)
    }

    fn from_line(line: &str) -> Option<Self> {
        let mut fields = line.split('\t');
        let window_a = fields.next()?.parse().ok()?;
        let window_b = fields.next()?.parse().ok()?;
        let similarity: u8 = fields.next()?.parse().ok()?;
        if similarity > 100 || fields.next().is_some() {
            return None;
        }
        Some(MatchLine { window_a, window_b, similarity })
    }

    fn same_key(&self, other: &Self) -> bool {
        (self.window_a, self.window_b) == (other.window_a, other.window_b)
    }
}

pub fn fragment_name(stem: &str, writer_id: usize) -> String {
    format!("{}{}{}", stem, FRAGMENT_SEPARATOR, writer_id)
}

pub fn stem_of(file_name: &str) -> &str {
    file_name.split(FRAGMENT_SEPARATOR).next().unwrap_or(file_name)
}

/// Entries of `dir` sorted by name; a missing directory has none.
pub fn list_dir(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };
    let mut paths = entries
        .map(|entry| entry.map(|e| e.path()))
        .collect::<std::io::Result<Vec<_>>>()?;
    paths.sort();
    Ok(paths)
}

/// Shard files of `dir` grouped by stem; the combined file sits in its own group.
pub fn group_by_stem(dir: &Path) -> Result<BTreeMap<String, Vec<PathBuf>>> {
    let mut groups: BTreeMap<String, Vec<PathBuf>> = BTreeMap::new();
    for path in list_dir(dir)? {
        if !path.is_file() {
            continue;
        }
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if name.starts_with('.') {
            continue;
        }
        groups.entry(stem_of(name).to_string()).or_default().push(path);
    }
    Ok(groups)
}

/// Appends whole lines in one write so concurrent appenders never split a line.
pub fn append_lines(path: &Path, lines: &[String]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut buffer = String::with_capacity(lines.iter().map(|l| l.len() + 1).sum());
    for line in lines {
        buffer.push_str(line);
        buffer.push('\n');
    }
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.write_all(buffer.as_bytes())?;
    Ok(())
}

/// Reads every record of the given files, sorted and de-duplicated.
pub fn read_records<R: ShardRecord>(paths: &[PathBuf]) -> Result<Vec<R>> {
    let mut records = Vec::new();
    for path in paths {
        let reader = BufReader::new(fs::File::open(path)?);
        for line in reader.lines() {
            let line = line?;
            if line.is_empty() {
                continue;
            }
            match R::from_line(&line) {
                Some(record) => records.push(record),
                None => warn!("Skipping malformed line in {:?}: {:?}", path, line),
            }
        }
    }
    records.sort();
    records.dedup_by(|later, earlier| later.same_key(earlier));
    Ok(records)
}

/// Replaces `path` with `records`, through a temp file. An empty set removes the file.
pub fn write_records<R: ShardRecord>(path: &Path, records: &[R]) -> Result<()> {
    if records.is_empty() {
        if path.exists() {
            fs::remove_file(path)?;
        }
        return Ok(());
    }
    let temp = path.with_file_name(format!(
        ".{}.tmp",
        path.file_name().and_then(|n| n.to_str()).unwrap_or("shard")
    ));
    {
        let mut writer = BufWriter::new(fs::File::create(&temp)?);
        for record in records {
            writer.write_all(record.to_line().as_bytes())?;
            writer.write_all(b"\n")?;
        }
        writer.flush()?;
    }
    fs::rename(&temp, path)?;
    Ok(())
}

/// Merges every fragment group in `dir` into its combined file.
///
/// Returns the number of groups rewritten.
pub fn combine_dir<R: ShardRecord>(dir: &Path) -> Result<usize> {
    let mut combined = 0;
    for (stem, paths) in group_by_stem(dir)? {
        let has_fragments = paths
            .iter()
            .any(|p| p.file_name().and_then(|n| n.to_str()).map_or(false, |n| n != stem));
        if !has_fragments {
            continue;
        }
        let records = read_records::<R>(&paths)?;
        let target = dir.join(&stem);
        write_records(&target, &records)?;
        for path in paths.iter().filter(|p| **p != target) {
            fs::remove_file(path)?;
        }
        trace!("Combined {} fragments into {:?}", paths.len(), target);
        combined += 1;
    }
    Ok(combined)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fragments_merge_sorted_and_unique() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join(fragment_name("7", 0));
        let b = dir.path().join(fragment_name("7", 1));
        append_lines(&a, &["3\t4".to_string(), "1\t2".to_string()]).unwrap();
        append_lines(&b, &["1\t2".to_string(), "0\t9".to_string()]).unwrap();

        assert_eq!(combine_dir::<CandidateLine>(dir.path()).unwrap(), 1);
        assert!(!a.exists() && !b.exists());

        let merged = read_records::<CandidateLine>(&[dir.path().join("7")]).unwrap();
        let windows: Vec<_> = merged.iter().map(|c| (c.window_a, c.window_b)).collect();
        assert_eq!(windows, vec![(0, 9), (1, 2), (3, 4)]);
    }

    #[test]
    fn malformed_lines_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x");
        fs::write(&path, "1\t2\t50\ngarbage\n3\t4\t101\n").unwrap();
        let lines = read_records::<MatchLine>(&[path]).unwrap();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].similarity, 50);
    }

    #[test]
    fn stems_strip_writer_suffix() {
        assert_eq!(stem_of("ab01#3"), "ab01");
        assert_eq!(stem_of("ab01"), "ab01");
        assert_eq!(fragment_name("ab01", 2), "ab01#2");
    }
}
