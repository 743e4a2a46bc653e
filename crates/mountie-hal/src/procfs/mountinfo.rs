//! Parsing helpers for `/proc/self/mountinfo` (and similar mountinfo files).

use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountInfo {
    pub mount_point: PathBuf,
    pub fstype: String,
    pub source: String,
    pub mount_options: Vec<String>,
}

pub fn parse_mountinfo(content: &str) -> Vec<MountInfo> {
    content
        .lines()
        .filter_map(|line| {
            // mountinfo format:
            //   <id> <parent> <major:minor> <root> <mount point> <opts> [optional...] - <fstype> <source> <superopts>
            let (pre, post) = line.split_once(" - ")?;
            let pre_fields: Vec<&str> = pre.split_whitespace().collect();
            if pre_fields.len() < 6 {
                return None;
            }
            let mut post_fields = post.split_whitespace();
            let fstype = post_fields.next()?.to_string();
            let source = unescape_mount_path(post_fields.next()?);
            Some(MountInfo {
                mount_point: PathBuf::from(unescape_mount_path(pre_fields[4])),
                fstype,
                source,
                mount_options: pre_fields[5].split(',').map(str::to_string).collect(),
            })
        })
        .collect()
}

/// The entry currently visible at `path`. Later entries shadow earlier ones.
pub fn find_mount<'a>(path: &Path, entries: &'a [MountInfo]) -> Option<&'a MountInfo> {
    let target = normalize_path(path);
    entries
        .iter()
        .rev()
        .find(|entry| normalize_path(&entry.mount_point) == target)
}

pub fn is_mounted_from_info(path: &Path, entries: &[MountInfo]) -> bool {
    find_mount(path, entries).is_some()
}

pub fn unescape_mount_path(raw: &str) -> String {
    raw.replace("\\040", " ")
        .replace("\\011", "\t")
        .replace("\\012", "\n")
        .replace("\\134", "\\")
}

pub(crate) fn normalize_path(path: &Path) -> String {
    let s = path.to_string_lossy();
    if s.len() > 1 && s.ends_with('/') {
        s.trim_end_matches('/').to_string()
    } else {
        s.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "36 28 0:31 / / rw,relatime shared:1 - ext4 /dev/sda3 rw\n\
                          37 28 0:32 / /boot rw,relatime - vfat /dev/sda2 rw\n";

    #[test]
    fn parse_mountinfo_extracts_fields() {
        let entries = parse_mountinfo(SAMPLE);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].mount_point, PathBuf::from("/"));
        assert_eq!(entries[0].source, "/dev/sda3");
        assert_eq!(entries[0].fstype, "ext4");
        assert_eq!(entries[1].mount_point, PathBuf::from("/boot"));
        assert_eq!(entries[1].mount_options, vec!["rw", "relatime"]);
    }

    #[test]
    fn is_mounted_from_info_matches_paths() {
        let entries = parse_mountinfo(SAMPLE);
        assert!(is_mounted_from_info(Path::new("/"), &entries));
        assert!(is_mounted_from_info(Path::new("/boot/"), &entries));
        assert!(!is_mounted_from_info(Path::new("/mnt"), &entries));
    }

    #[test]
    fn mountinfo_unescapes_paths() {
        let sample = "36 28 0:31 / /mnt/data\\040disk rw,relatime - ext4 /dev/sda3 rw\n";
        let entries = parse_mountinfo(sample);
        assert_eq!(entries[0].mount_point, PathBuf::from("/mnt/data disk"));
    }

    #[test]
    fn stacked_mounts_report_topmost_source() {
        let sample = "40 28 0:40 / /data rw - ext4 /dev/sdb1 rw\n\
                      41 40 0:41 / /data rw - xfs /dev/sdc1 rw\n";
        let entries = parse_mountinfo(sample);
        let top = find_mount(Path::new("/data"), &entries).unwrap();
        assert_eq!(top.source, "/dev/sdc1");
    }

    #[test]
    fn malformed_lines_are_skipped() {
        let entries = parse_mountinfo("garbage\n36 28 0:31 / - ext4\n");
        assert!(entries.is_empty());
    }
}
