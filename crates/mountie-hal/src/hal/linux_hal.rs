//! Linux HAL implementation using mount(8), umount(8) and /etc/fstab.

use super::{MountBackend, MountProbe};
use crate::fstab::{Fstab, FstabEntry};
use crate::procfs::mountinfo::{find_mount, parse_mountinfo};
use crate::{CurrentState, DesiredSpec, HalError, HalResult};
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};
use std::time::Duration;
use wait_timeout::ChildExt;

const FSTAB_PATH: &str = "/etc/fstab";
const MOUNTINFO_PATH: &str = "/proc/self/mountinfo";

/// Real HAL implementation for Linux systems.
#[derive(Debug, Clone)]
pub struct LinuxHal {
    fstab_path: PathBuf,
    mountinfo_path: PathBuf,
    mount_program: String,
    umount_program: String,
    command_timeout: Option<Duration>,
    require_root: bool,
}

impl Default for LinuxHal {
    fn default() -> Self {
        Self::new()
    }
}

impl LinuxHal {
    pub fn new() -> Self {
        Self {
            fstab_path: PathBuf::from(FSTAB_PATH),
            mountinfo_path: PathBuf::from(MOUNTINFO_PATH),
            mount_program: "mount".to_string(),
            umount_program: "umount".to_string(),
            command_timeout: None,
            require_root: true,
        }
    }

    /// Edit a different fstab. Root is no longer required for writes.
    pub fn with_fstab_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.fstab_path = path.into();
        self.require_root = false;
        self
    }

    pub fn with_mountinfo_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.mountinfo_path = path.into();
        self
    }

    pub fn with_programs(mut self, mount: impl Into<String>, umount: impl Into<String>) -> Self {
        self.mount_program = mount.into();
        self.umount_program = umount.into();
        self
    }

    /// Kill mount/umount after `timeout`. Without one, a hung command blocks.
    pub fn with_command_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.command_timeout = timeout;
        self
    }

    pub fn fstab_path(&self) -> &Path {
        &self.fstab_path
    }

    fn read_fstab(&self) -> HalResult<Fstab> {
        match fs::read_to_string(&self.fstab_path) {
            Ok(content) => Ok(Fstab::parse(&content)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(Fstab::default()),
            Err(err) => Err(map_io_err(err)),
        }
    }

    fn write_fstab(&self, fstab: &Fstab) -> HalResult<()> {
        if self.require_root && !nix::unistd::geteuid().is_root() {
            return Err(HalError::PermissionDenied);
        }
        write_atomic(&self.fstab_path, fstab.to_string().as_bytes())
    }

    fn run(&self, program: &str, args: &[String]) -> HalResult<()> {
        log::debug!("exec: {} {}", program, args.join(" "));
        let mut cmd = Command::new(program);
        cmd.args(args);
        let output = output_with_timeout(program, &mut cmd, self.command_timeout)?;
        if !output.status.success() {
            return Err(output_failed(program, &output));
        }
        Ok(())
    }
}

fn map_command_err(program: &str, err: io::Error) -> HalError {
    if err.kind() == io::ErrorKind::NotFound {
        return HalError::CommandNotFound(program.to_string());
    }
    HalError::Io(err)
}

fn map_io_err(err: io::Error) -> HalError {
    if err.kind() == io::ErrorKind::PermissionDenied {
        return HalError::PermissionDenied;
    }
    HalError::Io(err)
}

fn output_failed(program: &str, output: &Output) -> HalError {
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    let lowered = stderr.to_ascii_lowercase();
    if lowered.contains("target is busy") || lowered.contains("device is busy") {
        return HalError::DiskBusy;
    }
    if lowered.contains("permission denied") || lowered.contains("must be superuser") {
        return HalError::PermissionDenied;
    }
    HalError::CommandFailed {
        program: program.to_string(),
        code: output.status.code(),
        stderr,
    }
}

fn output_with_timeout(
    program: &str,
    cmd: &mut Command,
    timeout: Option<Duration>,
) -> HalResult<Output> {
    cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
    let mut child = cmd.spawn().map_err(|e| map_command_err(program, e))?;

    let mut stdout = child.stdout.take();
    let mut stderr = child.stderr.take();

    // Drain pipes concurrently to avoid deadlocks on large output.
    let stdout_handle = std::thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut out) = stdout.take() {
            let _ = out.read_to_end(&mut buf);
        }
        buf
    });
    let stderr_handle = std::thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut err) = stderr.take() {
            let _ = err.read_to_end(&mut buf);
        }
        buf
    });

    let status = match timeout {
        None => child.wait().map_err(HalError::Io)?,
        Some(limit) => match child.wait_timeout(limit).map_err(HalError::Io)? {
            Some(status) => status,
            None => {
                let _ = child.kill();
                let _ = child.wait();
                let _ = stdout_handle.join();
                let _ = stderr_handle.join();
                return Err(HalError::CommandTimeout {
                    program: program.to_string(),
                    timeout_secs: limit.as_secs(),
                });
            }
        },
    };

    let stdout = stdout_handle.join().unwrap_or_default();
    let stderr = stderr_handle.join().unwrap_or_default();
    Ok(Output {
        status,
        stdout,
        stderr,
    })
}

/// Write via temp file + fsync + rename so a crash never leaves a torn fstab.
fn write_atomic(path: &Path, payload: &[u8]) -> HalResult<()> {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "fstab".to_string());
    let tmp_path = path.with_file_name(format!(".{file_name}.mountie.tmp"));

    let mut file = File::create(&tmp_path).map_err(map_io_err)?;
    file.write_all(payload)?;
    file.sync_all()?;

    if let Ok(meta) = fs::metadata(path) {
        fs::set_permissions(&tmp_path, meta.permissions())?;
    }
    fs::rename(&tmp_path, path).map_err(map_io_err)?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        if let Ok(dir) = File::open(parent) {
            dir.sync_all().ok();
        }
    }
    Ok(())
}

impl MountBackend for LinuxHal {
    fn name(&self) -> &str {
        "linux"
    }

    fn mount(&self, spec: &DesiredSpec) -> HalResult<()> {
        let mut args = Vec::new();
        if let Some(fstype) = &spec.fstype {
            args.push("-t".to_string());
            args.push(fstype.clone());
        }
        if let Some(options) = spec.options_string() {
            args.push("-o".to_string());
            args.push(options);
        }
        args.push(spec.device.clone());
        args.push(spec.mount_point.display().to_string());

        self.run(&self.mount_program, &args)
    }

    fn umount(&self, spec: &DesiredSpec) -> HalResult<()> {
        self.run(
            &self.umount_program,
            &[spec.mount_point.display().to_string()],
        )
    }

    fn remount(&self, spec: &DesiredSpec) -> HalResult<()> {
        let options = match spec.options_string() {
            Some(opts) => format!("remount,{opts}"),
            None => "remount".to_string(),
        };
        self.run(
            &self.mount_program,
            &[
                "-o".to_string(),
                options,
                spec.mount_point.display().to_string(),
            ],
        )
    }

    fn enable(&self, spec: &DesiredSpec) -> HalResult<()> {
        let mut fstab = self.read_fstab()?;
        let entry = FstabEntry::from_spec(spec);
        log::debug!(
            "fstab {}: writing {}",
            self.fstab_path.display(),
            entry.to_line()
        );
        fstab.upsert(entry);
        self.write_fstab(&fstab)
    }

    fn disable(&self, spec: &DesiredSpec) -> HalResult<()> {
        let mut fstab = self.read_fstab()?;
        let removed = fstab.remove(&spec.mount_point);
        if removed == 0 {
            log::warn!(
                "fstab {}: no entry for {} to remove",
                self.fstab_path.display(),
                spec.mount_point.display()
            );
            return Ok(());
        }
        self.write_fstab(&fstab)
    }

    fn options_unchanged(&self, spec: &DesiredSpec) -> HalResult<bool> {
        let fstab = self.read_fstab()?;
        Ok(fstab
            .find(&spec.mount_point)
            .is_some_and(|entry| entry.matches_spec(spec)))
    }
}

impl MountProbe for LinuxHal {
    fn current_state(&self, spec: &DesiredSpec) -> HalResult<CurrentState> {
        let content = fs::read_to_string(&self.mountinfo_path).map_err(map_io_err)?;
        let entries = parse_mountinfo(&content);
        let live = find_mount(&spec.mount_point, &entries);
        let fstab = self.read_fstab()?;

        Ok(CurrentState {
            is_mounted: live.is_some(),
            is_enabled_at_boot: fstab.find(&spec.mount_point).is_some(),
            device: live.map(|m| m.source.clone()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn hal_in(dir: &TempDir, fstab: &str, mountinfo: &str) -> LinuxHal {
        let fstab_path = dir.path().join("fstab");
        let mountinfo_path = dir.path().join("mountinfo");
        fs::write(&fstab_path, fstab).unwrap();
        fs::write(&mountinfo_path, mountinfo).unwrap();
        LinuxHal::new()
            .with_fstab_path(fstab_path)
            .with_mountinfo_path(mountinfo_path)
    }

    fn data_spec() -> DesiredSpec {
        DesiredSpec::new("LABEL=DATA", "/data")
            .unwrap()
            .with_fstype("ext4")
            .with_options(["noatime"])
            .with_dump_pass(0, 2)
    }

    #[test]
    fn probe_reports_live_device_and_boot_entry() {
        let dir = TempDir::new().unwrap();
        let hal = hal_in(
            &dir,
            "LABEL=DATA /data ext4 noatime 0 2\n",
            "40 28 8:17 / /data rw,noatime - ext4 /dev/sdb1 rw\n",
        );

        let state = hal.current_state(&data_spec()).unwrap();
        assert!(state.is_mounted);
        assert!(state.is_enabled_at_boot);
        assert_eq!(state.device.as_deref(), Some("/dev/sdb1"));
    }

    #[test]
    fn probe_treats_missing_fstab_as_not_enabled() {
        let dir = TempDir::new().unwrap();
        let mountinfo_path = dir.path().join("mountinfo");
        fs::write(&mountinfo_path, "").unwrap();
        let hal = LinuxHal::new()
            .with_fstab_path(dir.path().join("absent"))
            .with_mountinfo_path(mountinfo_path);

        let state = hal.current_state(&data_spec()).unwrap();
        assert_eq!(state, CurrentState::unmounted());
    }

    #[test]
    fn enable_then_options_unchanged() {
        let dir = TempDir::new().unwrap();
        let hal = hal_in(&dir, "# static\n/dev/root / ext4 defaults 0 1\n", "");
        let spec = data_spec();

        assert!(!hal.options_unchanged(&spec).unwrap());
        hal.enable(&spec).unwrap();
        assert!(hal.options_unchanged(&spec).unwrap());

        let written = fs::read_to_string(hal.fstab_path()).unwrap();
        assert!(written.starts_with("# static\n"));
        assert!(written.contains("LABEL=DATA\t/data\text4\tnoatime\t0\t2"));
    }

    #[test]
    fn options_unchanged_detects_drift() {
        let dir = TempDir::new().unwrap();
        let hal = hal_in(&dir, "LABEL=DATA /data ext4 noatime,nodev 0 2\n", "");
        assert!(!hal.options_unchanged(&data_spec()).unwrap());

        let reordered = data_spec().with_options(["nodev,noatime"]);
        assert!(hal.options_unchanged(&reordered).unwrap());
    }

    #[test]
    fn enable_rewrites_entry_for_another_device() {
        let dir = TempDir::new().unwrap();
        let hal = hal_in(&dir, "/dev/sdb1 /data ext4 noatime 0 2\n", "");
        let spec = DesiredSpec::new("/dev/sdc1", "/data")
            .unwrap()
            .with_fstype("ext4")
            .with_options(["noatime"])
            .with_dump_pass(0, 2);

        assert!(hal.current_state(&spec).unwrap().is_enabled_at_boot);
        assert!(!hal.options_unchanged(&spec).unwrap());

        hal.enable(&spec).unwrap();
        let written = fs::read_to_string(hal.fstab_path()).unwrap();
        assert_eq!(written, "/dev/sdc1\t/data\text4\tnoatime\t0\t2\n");
        assert!(hal.options_unchanged(&spec).unwrap());
    }

    #[test]
    fn disable_removes_entry() {
        let dir = TempDir::new().unwrap();
        let hal = hal_in(
            &dir,
            "/dev/root / ext4 defaults 0 1\nLABEL=DATA /data ext4 noatime 0 2\n",
            "",
        );
        hal.disable(&data_spec()).unwrap();

        let written = fs::read_to_string(hal.fstab_path()).unwrap();
        assert!(!written.contains("/data"));
        assert!(written.contains("/dev/root"));
    }

    #[test]
    fn missing_mount_binary_is_reported() {
        let dir = TempDir::new().unwrap();
        let hal = hal_in(&dir, "", "").with_programs(
            "/nonexistent/mountie-mount",
            "/nonexistent/mountie-umount",
        );
        let err = hal.mount(&data_spec()).unwrap_err();
        assert!(matches!(err, HalError::CommandNotFound(_)));
    }
}
