//! Exercises the filesystem-backed [`fif::LocalFileIo`] adapter end to end.

use fif::{LocalFileIo, Mount, MountOptions, VolumeOptions};

#[test]
fn a_volume_on_disk_survives_a_fresh_open() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("archive.fif");

    {
        let io = LocalFileIo::create(&path).expect("create backing file");
        let mut mount = Mount::create(io, VolumeOptions::default(), MountOptions::default()).expect("create volume");
        mount.mkdir("/docs").expect("mkdir");
        mount.put_file_contents("/docs/readme.txt", b"hello from disk").expect("put");
        mount.unmount().expect("unmount");
    }

    let io = LocalFileIo::open(&path).expect("reopen backing file");
    let mut mount = Mount::mount(io, MountOptions::default()).expect("mount");
    let contents = mount.get_file_contents("/docs/readme.txt").expect("get");
    assert_eq!(contents, b"hello from disk");
}
