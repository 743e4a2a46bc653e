//! Boot-time mount table (`/etc/fstab`) parsing and editing.
//!
//! Comments, blank lines and lines we cannot make sense of are carried through
//! untouched so rewriting the file only ever changes the entries we manage.

use crate::procfs::mountinfo::{normalize_path, unescape_mount_path};
use crate::DesiredSpec;
use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FstabEntry {
    pub spec: String,
    pub file: PathBuf,
    pub vfstype: String,
    pub mntops: Vec<String>,
    pub freq: u32,
    pub passno: u32,
}

impl FstabEntry {
    pub fn from_spec(spec: &DesiredSpec) -> Self {
        let mntops = if spec.options.is_empty() {
            vec!["defaults".to_string()]
        } else {
            spec.options.iter().cloned().collect()
        };
        Self {
            spec: spec.device.clone(),
            file: spec.mount_point.clone(),
            vfstype: spec.fstype.clone().unwrap_or_else(|| "auto".to_string()),
            mntops,
            freq: spec.dump,
            passno: spec.pass,
        }
    }

    fn parse(line: &str) -> Option<Self> {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 3 {
            return None;
        }
        let freq = match fields.get(4) {
            Some(v) => v.parse().ok()?,
            None => 0,
        };
        let passno = match fields.get(5) {
            Some(v) => v.parse().ok()?,
            None => 0,
        };
        Some(Self {
            spec: unescape_mount_path(fields[0]),
            file: PathBuf::from(unescape_mount_path(fields[1])),
            vfstype: fields[2].to_string(),
            mntops: fields
                .get(3)
                .unwrap_or(&"defaults")
                .split(',')
                .map(str::to_string)
                .collect(),
            freq,
            passno,
        })
    }

    pub fn to_line(&self) -> String {
        format!(
            "{}\t{}\t{}\t{}\t{}\t{}",
            escape_field(&self.spec),
            escape_field(&self.file.to_string_lossy()),
            self.vfstype,
            self.mntops.join(","),
            self.freq,
            self.passno
        )
    }

    /// Whether this entry already matches what `spec` would write.
    pub fn matches_spec(&self, spec: &DesiredSpec) -> bool {
        if self.spec != spec.device {
            return false;
        }
        if !options_equivalent(&self.mntops, &spec.options) {
            return false;
        }
        if let Some(fstype) = &spec.fstype {
            if fstype != &self.vfstype {
                return false;
            }
        }
        self.freq == spec.dump && self.passno == spec.pass
    }

    fn is_for(&self, mount_point: &Path) -> bool {
        normalize_path(&self.file) == normalize_path(mount_point)
    }
}

/// Order-insensitive option comparison; `defaults` alone means "no options".
pub fn options_equivalent(persisted: &[String], desired: &BTreeSet<String>) -> bool {
    normalize_options(persisted.iter()) == normalize_options(desired.iter())
}

fn normalize_options<'a>(opts: impl Iterator<Item = &'a String>) -> BTreeSet<&'a str> {
    opts.map(|o| o.trim())
        .filter(|o| !o.is_empty() && *o != "defaults")
        .collect()
}

fn escape_field(raw: &str) -> String {
    raw.replace('\\', "\\134")
        .replace(' ', "\\040")
        .replace('\t', "\\011")
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Line {
    Entry(FstabEntry),
    Verbatim(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Fstab {
    lines: Vec<Line>,
}

impl Fstab {
    pub fn parse(content: &str) -> Self {
        let lines = content
            .lines()
            .map(|raw| {
                let trimmed = raw.trim();
                if trimmed.is_empty() || trimmed.starts_with('#') {
                    return Line::Verbatim(raw.to_string());
                }
                match FstabEntry::parse(trimmed) {
                    Some(entry) => Line::Entry(entry),
                    None => {
                        log::warn!("fstab: keeping unparseable line as-is: {raw}");
                        Line::Verbatim(raw.to_string())
                    }
                }
            })
            .collect();
        Self { lines }
    }

    pub fn entries(&self) -> impl Iterator<Item = &FstabEntry> {
        self.lines.iter().filter_map(|line| match line {
            Line::Entry(entry) => Some(entry),
            Line::Verbatim(_) => None,
        })
    }

    /// The entry that wins at boot for `mount_point` (the last one listed).
    pub fn find(&self, mount_point: &Path) -> Option<&FstabEntry> {
        self.entries().filter(|e| e.is_for(mount_point)).last()
    }

    /// Replace every entry for the entry's mount point with `entry`, keeping
    /// the position of the first one. Appends when there was none.
    pub fn upsert(&mut self, entry: FstabEntry) {
        let mut replacement = Some(entry.clone());
        let mut kept = Vec::with_capacity(self.lines.len() + 1);
        for line in self.lines.drain(..) {
            match line {
                Line::Entry(existing) if existing.is_for(&entry.file) => {
                    if let Some(new) = replacement.take() {
                        kept.push(Line::Entry(new));
                    }
                }
                other => kept.push(other),
            }
        }
        if let Some(new) = replacement {
            kept.push(Line::Entry(new));
        }
        self.lines = kept;
    }

    /// Drop every entry for `mount_point`, returning how many were removed.
    pub fn remove(&mut self, mount_point: &Path) -> usize {
        let before = self.lines.len();
        self.lines
            .retain(|line| !matches!(line, Line::Entry(e) if e.is_for(mount_point)));
        before - self.lines.len()
    }
}

impl fmt::Display for Fstab {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for line in &self.lines {
            match line {
                Line::Entry(entry) => writeln!(f, "{}", entry.to_line())?,
                Line::Verbatim(raw) => writeln!(f, "{raw}")?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "# /etc/fstab\n\
                          UUID=abcd  /      ext4  defaults          0  1\n\
                          \n\
                          LABEL=DATA /data  ext4  noatime,nodev     0  2\n";

    #[test]
    fn parse_keeps_comments_and_finds_entries() {
        let fstab = Fstab::parse(SAMPLE);
        assert_eq!(fstab.entries().count(), 2);
        let data = fstab.find(Path::new("/data")).unwrap();
        assert_eq!(data.spec, "LABEL=DATA");
        assert_eq!(data.mntops, vec!["noatime", "nodev"]);
        assert_eq!(data.passno, 2);
        assert!(fstab.to_string().starts_with("# /etc/fstab\n"));
    }

    #[test]
    fn missing_freq_and_passno_default_to_zero() {
        let fstab = Fstab::parse("/dev/sdb1 /mnt/usb vfat\n");
        let entry = fstab.find(Path::new("/mnt/usb")).unwrap();
        assert_eq!(entry.mntops, vec!["defaults"]);
        assert_eq!((entry.freq, entry.passno), (0, 0));
    }

    #[test]
    fn last_entry_wins() {
        let fstab = Fstab::parse("/dev/a /mnt ext4 ro 0 0\n/dev/b /mnt/ ext4 rw 0 0\n");
        assert_eq!(fstab.find(Path::new("/mnt")).unwrap().spec, "/dev/b");
    }

    #[test]
    fn upsert_replaces_in_place_and_collapses_duplicates() {
        let mut fstab = Fstab::parse(
            "/dev/a /mnt ext4 ro 0 0\n/dev/root / ext4 defaults 0 1\n/dev/b /mnt ext4 rw 0 0\n",
        );
        let spec = DesiredSpec::new("/dev/c", "/mnt")
            .unwrap()
            .with_fstype("xfs")
            .with_options(["noatime"]);
        fstab.upsert(FstabEntry::from_spec(&spec));

        let rendered = fstab.to_string();
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], "/dev/c\t/mnt\txfs\tnoatime\t0\t0");
        assert!(lines[1].starts_with("/dev/root"));
    }

    #[test]
    fn remove_drops_all_entries_for_mount_point() {
        let mut fstab = Fstab::parse(SAMPLE);
        assert_eq!(fstab.remove(Path::new("/data")), 1);
        assert!(fstab.find(Path::new("/data")).is_none());
        assert_eq!(fstab.remove(Path::new("/data")), 0);
    }

    #[test]
    fn spaces_in_paths_round_trip() {
        let spec = DesiredSpec::new("/dev/sdb1", "/mnt/my disk").unwrap();
        let line = FstabEntry::from_spec(&spec).to_line();
        assert!(line.contains("/mnt/my\\040disk"));
        let fstab = Fstab::parse(&line);
        assert!(fstab.find(Path::new("/mnt/my disk")).is_some());
    }

    #[test]
    fn entry_for_another_device_does_not_match() {
        let fstab = Fstab::parse("/dev/sdb1 /data ext4 noatime 0 0\n");
        let entry = fstab.find(Path::new("/data")).unwrap();
        let spec = DesiredSpec::new("/dev/sdc1", "/data")
            .unwrap()
            .with_fstype("ext4")
            .with_options(["noatime"]);
        assert!(!entry.matches_spec(&spec));

        let same = DesiredSpec::new("/dev/sdb1", "/data")
            .unwrap()
            .with_fstype("ext4")
            .with_options(["noatime"]);
        assert!(entry.matches_spec(&same));
    }

    #[test]
    fn options_compare_without_order_or_defaults() {
        let desired: BTreeSet<String> = ["nodev", "noatime"].iter().map(|s| s.to_string()).collect();
        assert!(options_equivalent(
            &["noatime".to_string(), "nodev".to_string()],
            &desired
        ));
        assert!(options_equivalent(&["defaults".to_string()], &BTreeSet::new()));
        assert!(!options_equivalent(&["noatime".to_string()], &desired));
    }
}
