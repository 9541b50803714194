//! Command builders for the external disc tools
//!
//! Each builder only assembles a [`Command`]; running it is the job of a
//! [`ProcessRunner`](crate::process::ProcessRunner).

use std::path::Path;
use std::process::Command;

/// Start a command that may need root, prefixed with `sudo` when requested
fn privileged(program: &str, use_sudo: bool) -> Command {
    if use_sudo {
        let mut cmd = Command::new("sudo");
        cmd.arg(program);
        cmd
    } else {
        Command::new(program)
    }
}

/// `blkid <drive>`: volume metadata of the inserted disc
pub fn build_blkid_command(drive: &Path) -> Command {
    let mut cmd = Command::new("blkid");
    cmd.arg(drive);
    cmd
}

/// `cdparanoia -sQ -d <drive>`: audio table of contents, exits non-zero without one
pub fn build_toc_query_command(drive: &Path) -> Command {
    let mut cmd = Command::new("cdparanoia");
    cmd.arg("-sQ").arg("-d").arg(drive);
    cmd
}

/// `makemkvcon --robot mkv disc:<index> all <dest>`: rip every title into `dest`
pub fn build_makemkv_command(drive_index: u32, dest: &Path) -> Command {
    let mut cmd = Command::new("makemkvcon");
    cmd.arg("--robot")
        .arg("mkv")
        .arg(format!("disc:{}", drive_index))
        .arg("all")
        .arg(dest);
    cmd
}

/// `abcde -d <drive> -o flac -B -x -N`, run inside the audio staging directory.
///
/// `-N` must stay: abcde may not prompt, nothing answers it.
pub fn build_abcde_command(drive: &Path, staging_dir: &Path) -> Command {
    let mut cmd = Command::new("abcde");
    cmd.arg("-d")
        .arg(drive)
        .arg("-o")
        .arg("flac")
        .arg("-B")
        .arg("-x")
        .arg("-N")
        .current_dir(staging_dir);
    cmd
}

/// `dd if=<drive> of=<dest> bs=2048 status=progress`: raw image of a data disc
pub fn build_dd_command(drive: &Path, dest: &Path) -> Command {
    let mut cmd = Command::new("dd");
    let mut input = std::ffi::OsString::from("if=");
    input.push(drive);
    let mut output = std::ffi::OsString::from("of=");
    output.push(dest);
    cmd.arg(input).arg(output).arg("bs=2048").arg("status=progress");
    cmd
}

pub fn build_mount_command(drive: &Path, mount_point: &Path, use_sudo: bool) -> Command {
    let mut cmd = privileged("mount", use_sudo);
    cmd.arg(drive).arg(mount_point);
    cmd
}

pub fn build_umount_command(mount_point: &Path, use_sudo: bool) -> Command {
    let mut cmd = privileged("umount", use_sudo);
    cmd.arg(mount_point);
    cmd
}

pub fn build_eject_command(drive: &Path, use_sudo: bool) -> Command {
    let mut cmd = privileged("eject", use_sudo);
    cmd.arg("-F").arg(drive);
    cmd
}

#[cfg(test)]
pub(crate) fn command_args(cmd: &Command) -> Vec<String> {
    cmd.get_args()
        .filter_map(|arg| arg.to_str().map(String::from))
        .collect()
}
