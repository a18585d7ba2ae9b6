// tests/serialization.rs

//! Unit set files: full-fidelity save/load and damage detection.

mod common;

use common::*;
use provisioner::metadata::io::{load_units, read_units, save_units, write_units};
use provisioner::metadata::{
    ArtifactKey, Filter, InstallableUnit, ProvidedCapability, Requirement, UpdateDescriptor,
};
use provisioner::progress::NullMonitor;
use provisioner::repository::{FileRepository, MetadataRepository};
use provisioner::{Error, Query};
use tempfile::TempDir;

/// A unit using every optional field
fn rich_unit() -> InstallableUnit {
    builder("org.example.app", "2.1.0.qualifier")
        .provides(
            ProvidedCapability::new("java.package", "org.example.api", v("2.1.0"))
                .with_attribute("os", "linux"),
        )
        .requires(
            Requirement::unit("org.example.core", range("[2.0.0,3.0.0)"))
                .with_filter(Filter::parse("(os=linux)").unwrap()),
        )
        .requires(Requirement::unit("org.example.docs", range("")).optional())
        .property("name", "Example application")
        .touchpoint("install", "mkdir(path:bin)")
        .touchpoint("configure", "mkdir(path:etc)")
        .update_descriptor(UpdateDescriptor::new("org.example.app", range("[1.0.0,2.1.0)")))
        .artifact(ArtifactKey::new("binary", "org.example.app", v("2.1.0")))
        .singleton(true)
        .build()
        .unwrap()
}

fn patch_unit() -> InstallableUnit {
    builder("org.example.fix", "1.0.0")
        .patch(patch_details(
            ("org.example.core", ""),
            ("org.example.core", "[2.0.1,3.0.0)"),
            "org.example.app",
            Some(("org.example.app", "[2.0.0,2.1.0]")),
        ))
        .build()
        .unwrap()
}

fn encode(units: &[InstallableUnit]) -> String {
    let mut buf = Vec::new();
    write_units(&mut buf, units).unwrap();
    String::from_utf8(buf).unwrap()
}

#[test]
fn test_file_preserves_every_field() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("repo").join("units.txt");
    let units = vec![rich_unit(), patch_unit(), unit("plain", "1.0.0").as_ref().clone()];

    save_units(&path, &units).unwrap();
    let loaded = load_units(&path).unwrap();

    assert_eq!(loaded, units);
    assert!(loaded[1].is_patch());
    assert_eq!(loaded[0].instructions_for("install"), vec!["mkdir(path:bin)"]);
}

#[test]
fn test_empty_set_round_trips_through_file() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("empty.txt");

    save_units(&path, &[]).unwrap();
    assert!(std::fs::metadata(&path).unwrap().len() > 0);
    assert!(load_units(&path).unwrap().is_empty());
}

#[test]
fn test_truncated_file_is_rejected() {
    let text = encode(&[rich_unit(), patch_unit()]);
    let lines: Vec<&str> = text.lines().collect();

    for keep in 0..lines.len() {
        let truncated = lines[..keep].join("\n");
        let err = read_units(truncated.as_bytes()).unwrap_err();
        assert!(matches!(err, Error::Deserialization(_)), "kept {} lines", keep);
    }

    // Cut in the middle of a record
    let cut = &text[..text.len() / 2];
    assert!(matches!(read_units(cut.as_bytes()), Err(Error::Deserialization(_))));
}

#[test]
fn test_corrupted_record_is_rejected() {
    let text = encode(&[rich_unit()]);
    let damaged = text.replacen("Example application", "Exemple application", 1);
    assert!(matches!(
        read_units(damaged.as_bytes()),
        Err(Error::Deserialization(_))
    ));

    let no_delimiter = text.replacen('|', " ", 1);
    assert!(matches!(
        read_units(no_delimiter.as_bytes()),
        Err(Error::Deserialization(_))
    ));
}

#[test]
fn test_invalid_utf8_is_rejected_as_damage() {
    let mut bytes = encode(&[]).into_bytes();
    bytes.insert(bytes.len() / 2, 0xff);
    let err = read_units(bytes.as_slice()).unwrap_err();
    assert!(matches!(err, Error::Deserialization(_)), "{:?}", err);

    let mut bytes = encode(&[rich_unit()]).into_bytes();
    let last = bytes.len() - 2;
    bytes.insert(last, 0xfe);
    let err = read_units(bytes.as_slice()).unwrap_err();
    assert!(matches!(err, Error::Deserialization(_)), "{:?}", err);
}

#[test]
fn test_trailing_data_after_end_is_rejected() {
    let text = encode(&[rich_unit()]);
    let extra = encode(&[patch_unit()]);
    let doubled = format!("{}{}", text, extra);
    assert!(matches!(
        read_units(doubled.as_bytes()),
        Err(Error::Deserialization(_))
    ));
}

#[test]
fn test_file_repository_serves_loaded_units() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("main.units");
    let units = vec![
        unit("a", "1.0.0").as_ref().clone(),
        unit("a", "1.5.0").as_ref().clone(),
        unit("b", "1.0.0").as_ref().clone(),
    ];
    let created = FileRepository::create(&path, &units).unwrap();
    assert_eq!(created.len(), 3);

    let repo = FileRepository::load(&path).unwrap();
    assert_eq!(repo.name(), "main");
    let latest = repo
        .query(&Query::latest(Query::id("a")), &NullMonitor::new())
        .unwrap()
        .into_vec();
    assert_eq!(latest.len(), 1);
    assert_eq!(latest[0].version, v("1.5.0"));
}
