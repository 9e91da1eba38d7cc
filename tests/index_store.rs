use std::collections::HashSet;
use std::fs;

use dupfind::index::{IndexBackend, IndexHandle};
use dupfind::{CollectionId, Error, ErrorKind, IndexStore};
use rstest::*;
use tempfile::TempDir;

const D: usize = 4;

#[fixture]
fn temp_dir() -> TempDir {
    TempDir::new().unwrap()
}

#[fixture]
fn sample_vectors() -> Vec<[f32; D]> {
    vec![
        [1.0, 0.0, 0.0, 0.0],
        [0.0, 1.0, 0.0, 0.0],
        [0.5, 0.5, 0.5, 0.5],
        [-0.5, 0.5, -0.5, 0.5],
        [0.0, 0.0, 0.6, 0.8],
    ]
}

fn build(store: &IndexStore, vectors: &[[f32; D]]) -> IndexHandle {
    let mut handle = store.create_index().unwrap();
    for (i, v) in vectors.iter().enumerate() {
        handle.add_item(i, v).unwrap();
    }
    handle.build(10).unwrap();
    handle
}

fn all_scores(handle: &IndexHandle) -> Vec<f32> {
    let n = handle.item_count().unwrap();
    let mut scores = vec![];
    for i in 0..n {
        for j in i + 1..n {
            scores.push(handle.score(i, j).unwrap());
        }
    }
    scores
}

#[rstest]
#[case::flat(IndexBackend::Flat)]
#[case::usearch(IndexBackend::Usearch)]
fn test_save_load_round_trip(
    temp_dir: TempDir,
    sample_vectors: Vec<[f32; D]>,
    #[case] backend: IndexBackend,
) {
    let store = IndexStore::open(temp_dir.path(), D, backend).unwrap();
    let mut handle = build(&store, &sample_vectors);
    let before = all_scores(&handle);

    let id = store.save_index(&mut handle, false).unwrap();
    assert!(handle.is_loaded());
    assert!(store.path_of(id).is_file());

    let loaded = store.load_index(id).unwrap();
    assert!(loaded.is_built().unwrap());
    assert_eq!(loaded.item_count().unwrap(), sample_vectors.len());
    let after = all_scores(&loaded);
    assert_eq!(before.len(), after.len());
    for (a, b) in before.iter().zip(&after) {
        assert!((a - b).abs() < 1e-6, "{} != {}", a, b);
    }
}

#[rstest]
#[case::mmap(false)]
#[case::no_mmap(true)]
fn test_flat_load_modes(temp_dir: TempDir, sample_vectors: Vec<[f32; D]>, #[case] no_mmap: bool) {
    let store = IndexStore::open(temp_dir.path(), D, IndexBackend::Flat).unwrap().mmap(!no_mmap);
    let mut handle = build(&store, &sample_vectors);
    let id = store.save_index(&mut handle, true).unwrap();

    let loaded = store.load_index(id).unwrap();
    assert_eq!(loaded.item_count().unwrap(), 5);
    assert!((loaded.score(0, 2).unwrap() - 0.5).abs() < 1e-6);
}

#[rstest]
fn test_save_with_unload(temp_dir: TempDir, sample_vectors: Vec<[f32; D]>) {
    let store = IndexStore::open(temp_dir.path(), D, IndexBackend::Flat).unwrap();
    let mut handle = build(&store, &sample_vectors);

    store.save_index(&mut handle, true).unwrap();
    assert!(!handle.is_loaded());
    assert!(matches!(handle.score(0, 1), Err(Error::UseAfterUnload)));
    assert!(matches!(handle.item_count(), Err(Error::UseAfterUnload)));

    // 重复释放无副作用
    store.unload(&mut handle);
    store.unload(&mut handle);
    assert_eq!(handle.item_count().unwrap_err().kind(), ErrorKind::UseAfterUnload);
}

#[rstest]
#[case::flat(IndexBackend::Flat)]
#[case::usearch(IndexBackend::Usearch)]
fn test_load_not_found(temp_dir: TempDir, #[case] backend: IndexBackend) {
    let store = IndexStore::open(temp_dir.path(), D, backend).unwrap();
    let id = CollectionId::random();
    let err = store.load_index(id).err().unwrap();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert!(matches!(err, Error::NotFound(x) if x == id));
}

#[rstest]
#[case::flat(IndexBackend::Flat)]
#[case::usearch(IndexBackend::Usearch)]
fn test_load_truncated(temp_dir: TempDir, sample_vectors: Vec<[f32; D]>, #[case] backend: IndexBackend) {
    let store = IndexStore::open(temp_dir.path(), D, backend).unwrap();
    let mut handle = build(&store, &sample_vectors);
    let id = store.save_index(&mut handle, true).unwrap();

    let path = store.path_of(id);
    let data = fs::read(&path).unwrap();

    for len in [0, 10, 40, 100, data.len() / 2, data.len() - 1] {
        fs::write(&path, &data[..len]).unwrap();
        let err = store.load_index(id).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::CorruptIndex, "len = {}", len);
    }
}

#[rstest]
#[case::flat(IndexBackend::Flat)]
#[case::usearch(IndexBackend::Usearch)]
fn test_load_garbage(temp_dir: TempDir, #[case] backend: IndexBackend) {
    let store = IndexStore::open(temp_dir.path(), D, backend).unwrap();
    let id = CollectionId::random();
    for garbage in [vec![0x42u8; 256], vec![0u8; 4096]] {
        fs::write(store.path_of(id), garbage).unwrap();
        let err = store.load_index(id).err().unwrap();
        assert!(matches!(err, Error::CorruptIndex { .. }));
    }
}

#[rstest]
#[case::flat(IndexBackend::Flat)]
#[case::usearch(IndexBackend::Usearch)]
fn test_load_flipped_payload(temp_dir: TempDir, sample_vectors: Vec<[f32; D]>, #[case] backend: IndexBackend) {
    let store = IndexStore::open(temp_dir.path(), D, backend).unwrap();
    let mut handle = build(&store, &sample_vectors);
    let id = store.save_index(&mut handle, true).unwrap();

    let path = store.path_of(id);
    let mut data = fs::read(&path).unwrap();
    let mid = data.len() / 2;
    data[mid] ^= 0x01;
    fs::write(&path, data).unwrap();
    assert_eq!(store.load_index(id).err().unwrap().kind(), ErrorKind::CorruptIndex);
}

/// 文件头中的构建参数为 0，但校验和是正确的
#[rstest]
#[case::flat(IndexBackend::Flat)]
#[case::usearch(IndexBackend::Usearch)]
fn test_load_never_built(temp_dir: TempDir, sample_vectors: Vec<[f32; D]>, #[case] backend: IndexBackend) {
    let store = IndexStore::open(temp_dir.path(), D, backend).unwrap();
    let mut handle = build(&store, &sample_vectors);
    let id = store.save_index(&mut handle, true).unwrap();

    let path = store.path_of(id);
    let mut data = fs::read(&path).unwrap();
    data[12..16].fill(0);
    let body = data.len() - 32;
    let checksum = blake3::hash(&data[..body]);
    data[body..].copy_from_slice(checksum.as_bytes());
    fs::write(&path, data).unwrap();

    let err = store.load_index(id).err().unwrap();
    assert!(matches!(err, Error::CorruptIndex { .. }), "{:?}", err);
}

#[rstest]
#[case::flat(IndexBackend::Flat)]
#[case::usearch(IndexBackend::Usearch)]
fn test_load_dimension_mismatch(temp_dir: TempDir, sample_vectors: Vec<[f32; D]>, #[case] backend: IndexBackend) {
    let store = IndexStore::open(temp_dir.path(), D, backend).unwrap();
    let mut handle = build(&store, &sample_vectors);
    let id = store.save_index(&mut handle, true).unwrap();

    let other = IndexStore::open(temp_dir.path(), D + 1, backend).unwrap();
    let err = other.load_index(id).err().unwrap();
    assert!(matches!(err, Error::DimensionMismatch { expected: 5, got: 4 }));
}

#[rstest]
#[case::flat(IndexBackend::Flat)]
#[case::usearch(IndexBackend::Usearch)]
fn test_add_after_build(temp_dir: TempDir, sample_vectors: Vec<[f32; D]>, #[case] backend: IndexBackend) {
    let store = IndexStore::open(temp_dir.path(), D, backend).unwrap();
    let mut handle = build(&store, &sample_vectors);
    let err = handle.add_item(sample_vectors.len(), &[0.0; D]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AlreadyBuilt);
    assert!(matches!(handle.build(10), Err(Error::AlreadyBuilt)));
}

#[rstest]
fn test_save_unbuilt(temp_dir: TempDir) {
    let store = IndexStore::open(temp_dir.path(), D, IndexBackend::Flat).unwrap();
    let mut handle = store.create_index().unwrap();
    handle.add_item(0, &[1.0, 0.0, 0.0, 0.0]).unwrap();

    assert!(matches!(store.save_index(&mut handle, true), Err(Error::NotBuilt)));
    assert!(handle.is_loaded());
    assert_eq!(fs::read_dir(temp_dir.path()).unwrap().count(), 0);
}

#[rstest]
fn test_save_leaves_single_file(temp_dir: TempDir, sample_vectors: Vec<[f32; D]>) {
    let store = IndexStore::open(temp_dir.path(), D, IndexBackend::Flat).unwrap();
    let mut handle = build(&store, &sample_vectors);
    let id = store.save_index(&mut handle, true).unwrap();

    let names = fs::read_dir(temp_dir.path())
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect::<Vec<_>>();
    assert_eq!(names, vec![format!("{}.flat", id)]);
}

#[rstest]
fn test_save_redraws_taken_id(temp_dir: TempDir, sample_vectors: Vec<[f32; D]>) {
    let store = IndexStore::open(temp_dir.path(), D, IndexBackend::Flat).unwrap();
    let mut first = build(&store, &sample_vectors);
    let taken = store.save_index(&mut first, true).unwrap();
    let taken_data = fs::read(store.path_of(taken)).unwrap();

    let fresh = CollectionId::random();
    let mut ids = vec![taken, taken, fresh].into_iter();
    let mut calls = 0;
    let mut second = build(&store, &sample_vectors[..2]);
    let id = store
        .save_index_with(&mut second, true, || {
            calls += 1;
            ids.next().unwrap()
        })
        .unwrap();

    assert_eq!(id, fresh);
    assert_eq!(calls, 3);
    // 已有的集合没有被覆盖
    assert_eq!(fs::read(store.path_of(taken)).unwrap(), taken_data);
    assert_eq!(store.load_index(id).unwrap().item_count().unwrap(), 2);
}

#[rstest]
fn test_ids_are_unique(temp_dir: TempDir, sample_vectors: Vec<[f32; D]>) {
    let store = IndexStore::open(temp_dir.path(), D, IndexBackend::Flat).unwrap();
    let mut ids = HashSet::new();
    for _ in 0..50 {
        let mut handle = build(&store, &sample_vectors);
        ids.insert(store.save_index(&mut handle, true).unwrap());
    }
    assert_eq!(ids.len(), 50);
}

#[rstest]
fn test_save_to_removed_dir(temp_dir: TempDir, sample_vectors: Vec<[f32; D]>) {
    let dir = temp_dir.path().join("index");
    let store = IndexStore::open(&dir, D, IndexBackend::Flat).unwrap();
    let mut handle = build(&store, &sample_vectors);
    fs::remove_dir_all(&dir).unwrap();

    let err = store.save_index(&mut handle, true).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Storage);
    // 保存失败时不释放索引
    assert!(handle.is_loaded());
}

#[rstest]
fn test_open_on_file(temp_dir: TempDir) {
    let path = temp_dir.path().join("file");
    fs::write(&path, b"").unwrap();
    let err = IndexStore::open(&path, D, IndexBackend::Flat).err().unwrap();
    assert_eq!(err.kind(), ErrorKind::Storage);
}

#[rstest]
fn test_concurrent_loads(temp_dir: TempDir, sample_vectors: Vec<[f32; D]>) {
    let store = IndexStore::open(temp_dir.path(), D, IndexBackend::Flat).unwrap();
    let mut handle = build(&store, &sample_vectors);
    let id = store.save_index(&mut handle, true).unwrap();

    let scores = std::thread::scope(|s| {
        let tasks = (0..4)
            .map(|_| s.spawn(|| all_scores(&store.load_index(id).unwrap())))
            .collect::<Vec<_>>();
        tasks.into_iter().map(|t| t.join().unwrap()).collect::<Vec<_>>()
    });
    assert!(scores.windows(2).all(|w| w[0] == w[1]));
}
