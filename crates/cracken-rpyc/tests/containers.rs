use std::fs;

use cracken_rpyc::{
    is_archive, is_envelope, is_split_index, Archive, ArchiveError, ArchiveVersion, ArchiveWriter, Envelope, EnvelopeWriter,
};
use pretty_assertions::assert_eq;

#[test]
fn envelope_roundtrip_through_disk() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("script.rpyc");
    fs::write(&path, EnvelopeWriter::wrap(b"\x80\x02N.")?)?;

    let env = Envelope::read_file(&path)?;
    assert_eq!(env.payload, b"\x80\x02N.".to_vec());
    assert_eq!(env.slots.len(), 1);
    Ok(())
}

#[test]
fn missing_file_is_io() {
    let err = Envelope::read_file("/definitely/not/here.rpyc").err();
    assert!(matches!(err, Some(cracken_rpyc::FormatError::Io(_))));
}

#[test]
fn v2_archive_extracts_nested_members() -> Result<(), Box<dyn std::error::Error>> {
    let script = EnvelopeWriter::wrap(b"\x80\x02N.")?;
    let bytes = ArchiveWriter::new(ArchiveVersion::V2)
        .member("game/script.rpyc", &script)
        .member("game/images/bg.png", b"\x89PNG")
        .to_bytes()?;
    assert!(is_archive(&bytes));

    let dir = tempfile::tempdir()?;
    let archive = Archive::from_bytes(bytes)?;
    let written = archive.extract_to(dir.path())?;
    assert_eq!(written.len(), 2);

    let extracted = fs::read(dir.path().join("game/script.rpyc"))?;
    assert!(is_envelope(&extracted));
    assert_eq!(fs::read(dir.path().join("game/images/bg.png"))?, b"\x89PNG".to_vec());
    Ok(())
}

#[test]
fn v1_index_reads_members_from_its_data_file() -> Result<(), Box<dyn std::error::Error>> {
    let script = EnvelopeWriter::wrap(b"\x80\x02N.")?;
    let (index, data) = ArchiveWriter::new(ArchiveVersion::V1)
        .member("game/script.rpyc", &script)
        .member("game/images/bg.png", b"\x89PNG")
        .to_split()?;
    assert!(is_split_index(&index));

    let dir = tempfile::tempdir()?;
    let rpi = dir.path().join("data.rpi");
    fs::write(&rpi, &index)?;
    assert!(matches!(Archive::read_file(&rpi), Err(ArchiveError::MissingData { .. })));

    fs::write(dir.path().join("data.rpa"), &data)?;
    let archive = Archive::read_file(&rpi)?;
    assert_eq!(archive.version(), ArchiveVersion::V1);
    let written = archive.extract_to(dir.path().join("out"))?;
    assert_eq!(written.len(), 2);

    assert!(is_envelope(&fs::read(dir.path().join("out/game/script.rpyc"))?));
    assert_eq!(fs::read(dir.path().join("out/game/images/bg.png"))?, b"\x89PNG".to_vec());
    Ok(())
}

#[test]
fn traversal_member_aborts_extraction() -> Result<(), Box<dyn std::error::Error>> {
    let bytes = ArchiveWriter::new(ArchiveVersion::V3 { key: 7 }).member("../escape.txt", b"x").to_bytes()?;
    let dir = tempfile::tempdir()?;
    let archive = Archive::from_bytes(bytes)?;
    assert!(matches!(archive.extract_to(dir.path().join("out")), Err(ArchiveError::UnsafePath(_))));
    assert!(!dir.path().join("escape.txt").exists());
    Ok(())
}

#[test]
fn index_offset_into_member_data_is_corrupt() -> Result<(), Box<dyn std::error::Error>> {
    let mut bytes = ArchiveWriter::new(ArchiveVersion::V2).member("a", b"abc").to_bytes()?;
    // point the index at the member bytes, which are not a zlib stream
    bytes[8..24].copy_from_slice(b"0000000000000019");
    assert!(matches!(Archive::from_bytes(bytes), Err(ArchiveError::Corrupt(_))));
    Ok(())
}
