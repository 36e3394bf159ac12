// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Integration tests for data providers and their registry.
//!
//! # Test Coverage
//!
//! - Provider creation, byte streams, duplication and deletion
//! - Uid registration and ownership checks
//! - Relocation of the data directory, including its failure modes
//! - Collection of unreferenced providers
//! - Uid allocation under concurrent callers

mod common;

use std::{
    collections::HashSet,
    fs,
    io::{Read, Write},
};

use common::{pcm_pattern, setup_test};
use media_store::{DataProviderRegistry, Error, Time, Uid, mime};

fn write_text(registry: &DataProviderRegistry, text: &str) -> media_store::DataProvider {
    let provider = registry.create_provider(mime::TEXT_XML).unwrap();
    provider
        .open_write()
        .unwrap()
        .write_all(text.as_bytes())
        .unwrap();
    provider
}

fn read_text(provider: &media_store::DataProvider) -> String {
    let mut text = String::new();
    provider
        .open_read()
        .unwrap()
        .read_to_string(&mut text)
        .unwrap();
    text
}

#[test]
fn create_provider_makes_an_empty_file() {
    let (presentation, guard) = setup_test("create_provider");
    let registry = presentation.data_provider_registry();

    let provider = registry.create_provider(mime::AUDIO_WAV).unwrap();

    let path = provider.path().unwrap();
    assert!(path.starts_with(guard.path().join("Data")));
    assert_eq!(path.extension().unwrap(), "wav");
    assert!(path.exists());
    assert!(provider.is_initialized());
    assert!(provider.is_empty().unwrap());
    assert_eq!(provider.mime_type(), mime::AUDIO_WAV);

    let uid = provider.uid().unwrap();
    assert_eq!(registry.lookup(&uid).unwrap(), provider);
    assert_eq!(registry.uid_of(&provider).unwrap(), uid);
}

#[test]
fn provider_files_have_distinct_names() {
    let (presentation, _guard) = setup_test("distinct_names");
    let registry = presentation.data_provider_registry();

    let providers: Vec<_> = (0..20)
        .map(|_| registry.create_provider(mime::OCTET_STREAM).unwrap())
        .collect();

    let mut names: Vec<_> = providers
        .iter()
        .map(|provider| provider.relative_path().to_path_buf())
        .collect();
    names.sort();
    names.dedup();
    assert_eq!(names.len(), 20);
    assert!(names.iter().all(|name| name.extension().unwrap() == "bin"));
    assert_eq!(registry.len(), 20);
}

#[test]
fn write_then_read_back() {
    let (presentation, _guard) = setup_test("write_read");
    let registry = presentation.data_provider_registry();

    let provider = write_text(registry, "<note>hello</note>");

    assert_eq!(read_text(&provider), "<note>hello</note>");
    assert_eq!(provider.len().unwrap(), 18);
}

#[test]
fn duplicate_copies_every_byte() {
    let (presentation, _guard) = setup_test("duplicate");
    let registry = presentation.data_provider_registry();
    let provider = write_text(registry, "original content");

    let copy = provider.duplicate().unwrap();

    assert_ne!(copy.uid().unwrap(), provider.uid().unwrap());
    assert_ne!(copy.relative_path(), provider.relative_path());
    assert_eq!(copy.mime_type(), provider.mime_type());
    assert_eq!(read_text(&copy), "original content");
    assert_eq!(registry.len(), 2);
}

#[test]
fn delete_removes_file_and_uid() {
    let (presentation, _guard) = setup_test("delete_provider");
    let registry = presentation.data_provider_registry();
    let provider = write_text(registry, "bytes");
    let uid = provider.uid().unwrap();
    let path = provider.path().unwrap();

    provider.delete().unwrap();

    assert!(!path.exists());
    assert!(matches!(registry.lookup(&uid), Err(Error::UnknownId(_))));
    assert!(!registry.contains(&provider));
}

#[test]
fn remove_without_delete_keeps_the_file() {
    let (presentation, _guard) = setup_test("remove_keep");
    let registry = presentation.data_provider_registry();
    let provider = write_text(registry, "kept");
    let uid = provider.uid().unwrap();

    let removed = registry.remove(&uid, false).unwrap();

    assert_eq!(removed, provider);
    assert!(provider.path().unwrap().exists());
    assert!(registry.is_empty());

    registry.register(&provider, Uid::new("DP-kept")).unwrap();
    assert_eq!(provider.uid().unwrap(), Uid::new("DP-kept"));
    assert_eq!(read_text(&provider), "kept");
}

#[test]
fn register_checks_ownership_and_duplicates() {
    let (presentation, _guard) = setup_test("register");
    let (other, _other_guard) = setup_test("register_other");
    let registry = presentation.data_provider_registry();
    let provider = registry.create_provider(mime::TEXT_XML).unwrap();
    let uid = provider.uid().unwrap();

    assert!(matches!(
        registry.register(&provider, Uid::new("DP-again")),
        Err(Error::AlreadyManaged(_))
    ));

    let foreign = other
        .data_provider_registry()
        .create_provider(mime::TEXT_XML)
        .unwrap();
    assert!(matches!(
        registry.register(&foreign, Uid::new("DP-foreign")),
        Err(Error::NotOwner(_))
    ));
    assert!(matches!(
        registry.uid_of(&foreign),
        Err(Error::NotManagerOf(_))
    ));

    registry.remove(&uid, false).unwrap();
    let second = registry.create_provider(mime::TEXT_XML).unwrap();
    assert!(matches!(
        registry.register(&provider, second.uid().unwrap()),
        Err(Error::AlreadyManaged(_))
    ));
}

#[test]
fn relocate_moves_every_file() {
    let (presentation, guard) = setup_test("relocate");
    let registry = presentation.data_provider_registry();
    let first = write_text(registry, "first");
    let second = write_text(registry, "second");
    let old_dir = registry.data_directory_path();

    registry.relocate("Moved/Media", true, false).unwrap();

    assert_eq!(registry.data_directory(), std::path::Path::new("Moved/Media"));
    assert_eq!(
        registry.data_directory_path(),
        guard.path().join("Moved/Media")
    );
    assert!(!old_dir.exists());
    assert!(first.path().unwrap().starts_with(guard.path().join("Moved/Media")));
    assert_eq!(read_text(&first), "first");
    assert_eq!(read_text(&second), "second");
}

#[test]
fn relocate_can_keep_the_source() {
    let (presentation, _guard) = setup_test("relocate_keep");
    let registry = presentation.data_provider_registry();
    let provider = write_text(registry, "twice");
    let old_path = provider.path().unwrap();

    registry.relocate("Copy", false, false).unwrap();

    assert!(old_path.exists());
    assert_eq!(read_text(&provider), "twice");
    assert_ne!(provider.path().unwrap(), old_path);
}

#[test]
fn relocate_onto_an_existing_directory() {
    let (presentation, guard) = setup_test("relocate_conflict");
    let registry = presentation.data_provider_registry();
    let provider = write_text(registry, "content");
    let occupied = guard.path().join("Occupied");
    fs::create_dir_all(&occupied).unwrap();
    fs::write(occupied.join("stray.txt"), "stray").unwrap();

    assert!(matches!(
        registry.relocate("Occupied", true, false),
        Err(Error::DirectoryConflict { .. })
    ));
    assert_eq!(registry.data_directory(), std::path::Path::new("Data"));
    assert_eq!(read_text(&provider), "content");

    registry.relocate("Occupied", true, true).unwrap();
    assert_eq!(read_text(&provider), "content");
    assert!(!occupied.join("stray.txt").exists());
}

#[test]
fn relocate_into_itself_is_a_conflict() {
    let (presentation, _guard) = setup_test("relocate_nested");
    let registry = presentation.data_provider_registry();
    write_text(registry, "content");

    assert!(matches!(
        registry.relocate("Data/Inner", true, false),
        Err(Error::DirectoryConflict { .. })
    ));
    assert_eq!(registry.data_directory(), std::path::Path::new("Data"));
}

#[test]
fn relocate_with_a_missing_file_changes_nothing() {
    let (presentation, guard) = setup_test("relocate_missing");
    let registry = presentation.data_provider_registry();
    let kept = write_text(registry, "kept");
    let lost = write_text(registry, "lost");
    fs::remove_file(lost.path().unwrap()).unwrap();

    let result = registry.relocate("Elsewhere", true, false);

    assert!(matches!(result, Err(Error::ResourceMissing { .. })));
    assert_eq!(registry.data_directory(), std::path::Path::new("Data"));
    assert!(!guard.path().join("Elsewhere").exists());
    assert_eq!(read_text(&kept), "kept");
    assert!(matches!(lost.open_read(), Err(Error::ResourceMissing { .. })));

    // Only the data directory and the presentation root remain.
    let leftovers: Vec<_> = fs::read_dir(guard.path())
        .unwrap()
        .map(|entry| entry.unwrap().file_name())
        .collect();
    assert_eq!(leftovers, vec![std::ffi::OsString::from("Data")]);
}

#[test]
fn collect_unused_providers_keeps_referenced_ones() {
    let (presentation, _guard) = setup_test("collect_unused");
    let registry = presentation.data_provider_registry();
    let audio = presentation.media_data_registry().create_audio().unwrap();
    audio
        .append(pcm_pattern(882, 0).as_slice(), Time::from_millis(10))
        .unwrap();
    let stray = write_text(registry, "unreferenced");
    let stray_uid = stray.uid().unwrap();
    let stray_path = stray.path().unwrap();

    let collected = presentation.collect_unused_providers(true).unwrap();

    assert_eq!(collected, vec![stray_uid]);
    assert!(!stray_path.exists());
    assert_eq!(registry.len(), 1);
    assert!(registry.contains(&audio.used_providers()[0]));
    assert_eq!(audio.read_all().unwrap(), pcm_pattern(882, 0));

    assert!(presentation.collect_unused_providers(true).unwrap().is_empty());
}

#[test]
fn collect_unused_keeps_providers_it_could_not_delete() {
    let (presentation, _guard) = setup_test("collect_partial");
    let registry = presentation.data_provider_registry();
    let first = write_text(registry, "one");
    let stuck = write_text(registry, "two");
    let last = write_text(registry, "three");
    let stuck_path = stuck.path().unwrap();
    fs::remove_file(&stuck_path).unwrap();
    fs::create_dir(&stuck_path).unwrap();
    fs::write(stuck_path.join("pin"), b"x").unwrap();

    let result = presentation.collect_unused_providers(true);

    assert!(matches!(result, Err(Error::Io { .. })));
    assert_eq!(registry.providers(), vec![stuck.clone()]);
    assert!(!first.path().unwrap().exists());
    assert!(!last.path().unwrap().exists());

    fs::remove_dir_all(&stuck_path).unwrap();
    let collected = presentation.collect_unused_providers(true).unwrap();
    assert_eq!(collected.len(), 1);
    assert!(registry.is_empty());
}

/// Concurrent callers never receive the same uid or file.
#[test]
fn concurrent_creation_hands_out_distinct_uids() {
    let (presentation, _guard) = setup_test("concurrent_providers");
    let registry = presentation.data_provider_registry();

    let created: Vec<_> = std::thread::scope(|scope| {
        let workers: Vec<_> = (0..8)
            .map(|_| {
                scope.spawn(|| {
                    (0..25)
                        .map(|_| registry.create_provider(mime::AUDIO_WAV).unwrap())
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        workers
            .into_iter()
            .flat_map(|worker| worker.join().unwrap())
            .collect()
    });

    assert_eq!(registry.len(), 200);
    let uids: HashSet<Uid> = created
        .iter()
        .map(|provider| registry.uid_of(provider).unwrap())
        .collect();
    assert_eq!(uids.len(), 200);
    for uid in &uids {
        let provider = registry.lookup(uid).unwrap();
        assert_eq!(&registry.uid_of(&provider).unwrap(), uid);
    }
    let paths: HashSet<_> = created.iter().map(|provider| provider.path().unwrap()).collect();
    assert_eq!(paths.len(), 200);
}

#[test]
fn collect_unused_without_delete_leaves_files() {
    let (presentation, _guard) = setup_test("collect_keep");
    let registry = presentation.data_provider_registry();
    let stray = write_text(registry, "unreferenced");

    let collected = registry.collect_unused(std::iter::empty(), false).unwrap();

    assert_eq!(collected.len(), 1);
    assert!(registry.is_empty());
    assert!(stray.path().unwrap().exists());
}
