// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Integration tests for the media data registry: uid assignment, ownership
//! checks and single PCM format enforcement.

mod common;

use std::collections::HashSet;

use common::{pcm_pattern, setup_test};
use media_store::{Error, MediaData, MediaDataKind, PcmFormat, Time, Uid};

#[test]
fn uids_are_unique_and_resolve_both_ways() {
    let (presentation, _guard) = setup_test("uids");
    let registry = presentation.media_data_registry();

    let created: Vec<MediaData> = (0..5)
        .map(|_| registry.create(MediaDataKind::Audio).unwrap())
        .collect();

    let uids: HashSet<Uid> = created
        .iter()
        .map(|data| registry.uid_of(data).unwrap())
        .collect();
    assert_eq!(uids.len(), 5);
    for uid in &uids {
        let data = registry.lookup(uid).unwrap();
        assert_eq!(&registry.uid_of(&data).unwrap(), uid);
        assert_eq!(&data.uid().unwrap(), uid);
        assert_eq!(data.kind(), MediaDataKind::Audio);
    }
    assert_eq!(registry.entries().len(), 5);
}

#[test]
fn lookup_of_an_unknown_uid_fails() {
    let (presentation, _guard) = setup_test("unknown_uid");
    let registry = presentation.media_data_registry();

    let missing = Uid::new("MD404");
    assert!(matches!(registry.lookup(&missing), Err(Error::UnknownId(uid)) if uid == missing));
    assert!(matches!(registry.remove(&missing), Err(Error::UnknownId(_))));
}

#[test]
fn remove_detaches_without_touching_storage() {
    let (presentation, _guard) = setup_test("remove_detach");
    let registry = presentation.media_data_registry();
    let audio = registry.create_audio().unwrap();
    audio
        .append(pcm_pattern(882, 0).as_slice(), Time::from_millis(10))
        .unwrap();
    let uid = audio.uid().unwrap();

    let removed = registry.remove(&uid).unwrap();

    assert!(registry.is_empty());
    assert!(matches!(
        registry.uid_of(&removed),
        Err(Error::NotManagerOf(_))
    ));
    assert_eq!(presentation.data_provider_registry().len(), 1);
    assert_eq!(audio.read_all().unwrap(), pcm_pattern(882, 0));

    // Re-adding under the old uid restores the mapping.
    let readded = registry.add(&removed, Some(uid.clone())).unwrap();
    assert_eq!(readded, uid);
    assert_eq!(audio.uid().unwrap(), uid);
}

#[test]
fn add_rejects_duplicates_and_foreign_data() {
    let (presentation, _guard) = setup_test("add_checks");
    let (other, _other_guard) = setup_test("add_checks_other");
    let registry = presentation.media_data_registry();
    let audio: MediaData = registry.create(MediaDataKind::Audio).unwrap();

    assert!(matches!(
        registry.add(&audio, None),
        Err(Error::AlreadyManaged(_))
    ));

    let foreign = other.media_data_registry().create_audio().unwrap();
    assert!(matches!(
        registry.add(&MediaData::from(&foreign), None),
        Err(Error::NotOwner(_))
    ));

    let detached = registry.remove(&audio.uid().unwrap()).unwrap();
    let second = registry.create_audio().unwrap();
    let taken = second.uid().unwrap();
    assert!(matches!(
        registry.add(&detached, Some(taken)),
        Err(Error::AlreadyManaged(_))
    ));
    assert_eq!(registry.len(), 1);
}

#[test]
fn registry_copy_creates_a_new_entry() {
    let (presentation, _guard) = setup_test("registry_copy");
    let registry = presentation.media_data_registry();
    let audio = registry.create_audio().unwrap();
    audio
        .append(pcm_pattern(1764, 3).as_slice(), Time::from_millis(20))
        .unwrap();

    let copy = registry.copy(&audio.uid().unwrap()).unwrap();

    assert_ne!(copy.uid().unwrap(), audio.uid().unwrap());
    assert_eq!(copy.as_audio().unwrap().read_all().unwrap(), audio.read_all().unwrap());
    assert_eq!(registry.used_providers().len(), 2);
}

#[test]
fn enforced_format_blocks_mismatching_audio() {
    let (presentation, _guard) = setup_test("enforce");
    let registry = presentation.media_data_registry();
    let stereo = PcmFormat::new(2, 16, 48000).unwrap();
    registry.set_default_pcm_format(stereo).unwrap();
    registry.set_enforce_single_pcm_format(true).unwrap();
    assert!(registry.enforces_single_pcm_format());

    let audio = registry.create_audio().unwrap();
    assert_eq!(audio.pcm_format(), stereo);

    assert!(matches!(
        registry.create_audio_with_format(PcmFormat::default()),
        Err(Error::FormatConflict(_))
    ));
    assert!(matches!(
        audio.set_sample_rate(44100),
        Err(Error::FormatConflict(_))
    ));
    assert_eq!(audio.pcm_format(), stereo);
    assert_eq!(registry.len(), 1);

    assert!(matches!(
        registry.set_default_pcm_format(PcmFormat::default()),
        Err(Error::FormatConflict(_))
    ));
    assert_eq!(registry.default_pcm_format(), stereo);
}

#[test]
fn enforcement_cannot_start_while_formats_differ() {
    let (presentation, _guard) = setup_test("enforce_mismatch");
    let registry = presentation.media_data_registry();
    let mono = registry.create_audio().unwrap();
    let stereo = registry
        .create_audio_with_format(PcmFormat::new(2, 16, 44100).unwrap())
        .unwrap();

    assert!(matches!(
        registry.set_enforce_single_pcm_format(true),
        Err(Error::FormatConflict(_))
    ));
    assert!(!registry.enforces_single_pcm_format());

    stereo.set_channels(1).unwrap();
    registry.set_enforce_single_pcm_format(true).unwrap();
    assert_eq!(stereo.pcm_format(), mono.pcm_format());

    registry.set_enforce_single_pcm_format(false).unwrap();
    stereo.set_channels(2).unwrap();
}

#[test]
fn export_into_an_enforcing_registry_checks_the_format() {
    let (source, _source_guard) = setup_test("export_enforce_source");
    let (destination, _destination_guard) = setup_test("export_enforce_destination");
    let target = destination.media_data_registry();
    target
        .set_default_pcm_format(PcmFormat::new(1, 16, 22050).unwrap())
        .unwrap();
    target.set_enforce_single_pcm_format(true).unwrap();

    let audio = source.media_data_registry().create_audio().unwrap();
    audio
        .append(pcm_pattern(882, 0).as_slice(), Time::from_millis(10))
        .unwrap();

    assert!(matches!(
        audio.export(target),
        Err(Error::FormatConflict(_))
    ));
    assert!(target.is_empty());
    assert!(destination.data_provider_registry().is_empty());
}

/// Audio created from many threads at once gets distinct uids that resolve
/// back to the same audio.
#[test]
fn concurrent_creation_hands_out_distinct_uids() {
    let (presentation, _guard) = setup_test("concurrent_media");
    let registry = presentation.media_data_registry();

    let created: Vec<MediaData> = std::thread::scope(|scope| {
        let workers: Vec<_> = (0..8)
            .map(|_| {
                scope.spawn(|| {
                    (0..50)
                        .map(|_| MediaData::from(&registry.create_audio().unwrap()))
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        workers
            .into_iter()
            .flat_map(|worker| worker.join().unwrap())
            .collect()
    });

    assert_eq!(registry.len(), 400);
    let uids: HashSet<Uid> = created
        .iter()
        .map(|data| registry.uid_of(data).unwrap())
        .collect();
    assert_eq!(uids.len(), 400);
    for uid in &uids {
        let data = registry.lookup(uid).unwrap();
        assert_eq!(&registry.uid_of(&data).unwrap(), uid);
    }
}
