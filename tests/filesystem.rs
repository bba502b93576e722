//! End-to-end exercises of the public façade over an in-memory backing store.

use fif::{CompressionAlgorithm, MemoryIo, Mount, MountOptions, OpenMode, VolumeOptions};

fn fresh_mount() -> Mount<MemoryIo> {
    Mount::create(MemoryIo::new(), VolumeOptions::default(), MountOptions::default()).expect("create volume")
}

#[test]
fn nested_directories_and_files_round_trip() {
    let mut mount = fresh_mount();
    mount.mkdir("/a").expect("mkdir a");
    mount.mkdir("/a/b").expect("mkdir a/b");
    mount.put_file_contents("/a/b/c.txt", b"deeply nested").expect("put");

    let contents = mount.get_file_contents("/a/b/c.txt").expect("get");
    assert_eq!(contents, b"deeply nested");

    let mut top_level = Vec::new();
    mount
        .readdir("/", |name, _| {
            top_level.push(name.to_string());
            true
        })
        .expect("readdir /");
    assert_eq!(top_level, vec!["a"]);
}

#[test]
fn overwriting_a_file_replaces_its_contents() {
    let mut mount = fresh_mount();
    mount.put_file_contents("/notes.txt", b"first draft").expect("put first");
    mount.put_file_contents("/notes.txt", b"final version, much shorter").expect("put second");

    let contents = mount.get_file_contents("/notes.txt").expect("get");
    assert_eq!(contents, b"final version, much shorter");
}

#[test]
fn growing_a_file_past_many_blocks_preserves_earlier_bytes() {
    let mut mount = fresh_mount();
    let handle = mount
        .open(
            "/big.bin",
            OpenMode::CREATE | OpenMode::WRITE | OpenMode::FULLY_BUFFERED,
        )
        .expect("open");

    let chunk = vec![0xABu8; 4096];
    for _ in 0..8 {
        mount.write(handle, &chunk).expect("write chunk");
    }
    mount.close(handle).expect("close");

    let contents = mount.get_file_contents("/big.bin").expect("get");
    assert_eq!(contents.len(), 4096 * 8);
    assert!(contents.iter().all(|&b| b == 0xAB));
}

#[test]
fn compressed_files_report_uncompressed_size_but_store_fewer_bytes() {
    let mount_options = MountOptions {
        new_file_compression_algorithm: CompressionAlgorithm::ZLIB,
        new_file_compression_level: 9,
        ..MountOptions::default()
    };
    let mut mount = Mount::create(MemoryIo::new(), VolumeOptions::default(), mount_options).expect("create");

    let payload = b"aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa".repeat(32);
    mount.put_file_contents("/compressible.bin", &payload).expect("put");

    let info = mount.stat("/compressible.bin").expect("stat");
    assert_eq!(info.size as usize, payload.len());
    assert!(info.data_size < info.size, "highly repetitive data should compress smaller");

    let round_tripped = mount.get_file_contents("/compressible.bin").expect("get");
    assert_eq!(round_tripped, payload);
}

#[test]
fn unlink_frees_the_name_for_reuse() {
    let mut mount = fresh_mount();
    mount.put_file_contents("/a.txt", b"one").expect("put");
    mount.unlink("/a.txt").expect("unlink");
    mount.put_file_contents("/a.txt", b"two").expect("put again");

    let contents = mount.get_file_contents("/a.txt").expect("get");
    assert_eq!(contents, b"two");
}

#[test]
fn path_with_dot_dot_segments_resolves_like_a_shell_would() {
    let mut mount = fresh_mount();
    mount.mkdir("/a").expect("mkdir a");
    mount.put_file_contents("/a/sibling.txt", b"hi").expect("put");

    let contents = mount.get_file_contents("/a/../a/./sibling.txt").expect("get via dotted path");
    assert_eq!(contents, b"hi");
}
