mod common;
use common::{read_json, Study};
use megbids::headshape::select_point_file;
use megbids::{attach_headshapes, Error, FsEffects, Units};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

const TABLE: &str = "megid\tibbid\trandval\n\
                     C01\tA3122\t0\n\
                     C02\t\t1\n\
                     C03\tA3300\t0\n\
                     C04\tA3400\t1\n";

/// Head points in centimetres.
const POS_CM: &str = "12\n1 nasion 0.0 9.5 0.0\n2 lpa -7.2 0.0 0.0\n3 rpa 7.1 0.0 0.0\n4 -5.5 3.2 8.9\n";

/// Every file under `root` with its bytes.
fn snapshot(root: &Path) -> BTreeMap<PathBuf, Vec<u8>> {
    let mut out = BTreeMap::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        for entry in std::fs::read_dir(&dir).unwrap() {
            let path = entry.unwrap().path();
            if path.is_dir() {
                stack.push(path);
            } else {
                out.insert(path.clone(), std::fs::read(&path).unwrap());
            }
        }
    }
    out
}

fn set_mtime(path: &Path, secs: u64) {
    std::fs::File::options()
        .write(true)
        .open(path)
        .unwrap()
        .set_modified(SystemTime::UNIX_EPOCH + Duration::from_secs(secs))
        .unwrap();
}

#[test]
fn attaches_and_merges_sidecars() {
    let study = Study::new(TABLE);
    let src = study.write_pos("A3122_head.pos", POS_CM);
    set_mtime(&src, 1_600_000_000);
    let meg = study.add_meg_dir("sub-001", None, true);

    let report = attach_headshapes(&["C01"], &study.table(), &study.config, FsEffects::new(false)).unwrap();
    assert_eq!(report.success.len(), 1, "{:?}", report.failed);
    let done = &report.success[0];
    assert_eq!(done.point_file, "A3122_head.pos");
    assert_eq!(done.units, Units::Cm);

    let dest = meg.join("sub-001_acq-HEAD_headshape.pos");
    assert_eq!(done.destinations, [dest.clone()]);
    assert_eq!(std::fs::read_to_string(&dest).unwrap(), POS_CM);
    assert_eq!(
        std::fs::metadata(&dest).unwrap().modified().unwrap(),
        std::fs::metadata(&src).unwrap().modified().unwrap()
    );

    let coords = read_json(&meg.join("sub-001_coordsystem.json"));
    assert_eq!(coords["MEGCoordinateSystem"], "CTF");
    assert_eq!(coords["DigitizedHeadPoints"], "sub-001_acq-HEAD_headshape.pos");
    assert_eq!(coords["DigitizedHeadPointsCoordinateSystem"], "CTF");
    assert_eq!(coords["DigitizedHeadPointsCoordinateUnits"], "cm");
    // existing keys keep their position
    let keys: Vec<&String> = coords.as_object().unwrap().keys().collect();
    assert_eq!(keys[0], "MEGCoordinateSystem");

    let sidecar = read_json(&meg.join("sub-001_task-audiobase_meg.json"));
    assert_eq!(sidecar["DigitizedHeadPoints"], true);
    assert_eq!(sidecar["TaskName"], "audiobase");
}

#[test]
fn every_session_gets_a_copy() {
    let study = Study::new(TABLE);
    study.write_pos("A3122.pos", "100 -80 40\n90 60 -30\n");
    let ses1 = study.add_meg_dir("sub-001", Some("01"), true);
    let ses2 = study.add_meg_dir("sub-001", Some("02"), true);

    let report = attach_headshapes(&["C01"], &study.table(), &study.config, FsEffects::new(false)).unwrap();
    assert_eq!(report.success[0].units, Units::Mm);
    assert!(ses1.join("sub-001_ses-01_acq-HEAD_headshape.pos").exists());
    assert!(ses2.join("sub-001_ses-02_acq-HEAD_headshape.pos").exists());
    let coords = read_json(&ses2.join("sub-001_ses-02_coordsystem.json"));
    assert_eq!(coords["DigitizedHeadPoints"], "sub-001_ses-02_acq-HEAD_headshape.pos");
    assert_eq!(coords["DigitizedHeadPointsCoordinateUnits"], "mm");
}

#[test]
fn failures_are_isolated_per_subject() {
    let study = Study::new(TABLE);
    study.write_pos("A3122.pos", POS_CM);
    study.write_pos("A3400.pos", POS_CM);
    study.add_meg_dir("sub-001", None, true);

    // C02: blank ibbid; C03: no .pos file; C04: not converted; C09: not in table
    let subjects = ["C01", "C02", "C03", "C04", "C09"];
    let report = attach_headshapes(&subjects, &study.table(), &study.config, FsEffects::new(false)).unwrap();

    assert_eq!(report.success.len(), 1);
    assert_eq!(report.failed.len(), 4);
    let reason = |item: &str| {
        report.failed.iter().find(|n| n.item == item).map(|n| n.reason.clone()).unwrap()
    };
    assert!(reason("C02").contains("ibbid"));
    assert!(reason("C03").contains("A3300"));
    assert!(reason("C04").contains("MEG directory"));
    assert!(reason("C09").contains("not in reference table"));
}

#[test]
fn missing_coordsystem_is_skipped_not_failed() {
    let study = Study::new(TABLE);
    study.write_pos("A3122.pos", POS_CM);
    let meg = study.add_meg_dir("sub-001", None, false);

    let report = attach_headshapes(&["C01"], &study.table(), &study.config, FsEffects::new(false)).unwrap();
    assert_eq!(report.success.len(), 1);
    assert!(report.failed.is_empty());
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].to_string(), "C01: no coordsystem JSON found");
    assert!(meg.join("sub-001_acq-HEAD_headshape.pos").exists());
}

#[test]
fn dry_run_decides_the_same_and_writes_nothing() {
    let dry = Study::new(TABLE);
    let wet = Study::new(TABLE);
    for study in [&dry, &wet] {
        study.write_pos("A3122.pos", POS_CM);
        study.add_meg_dir("sub-001", None, false);
        // C03 has a truncated coordsystem sidecar
        study.write_pos("A3300.pos", POS_CM);
        let meg = study.add_meg_dir("sub-003", None, true);
        std::fs::write(meg.join("sub-003_coordsystem.json"), "{ truncated").unwrap();
    }
    let subjects = ["C01", "C02", "C03"];
    let before = snapshot(dry.dir.path());

    let dry_report = attach_headshapes(&subjects, &dry.table(), &dry.config, FsEffects::new(true)).unwrap();
    let wet_report = attach_headshapes(&subjects, &wet.table(), &wet.config, FsEffects::new(false)).unwrap();

    assert_eq!(dry_report.failed, wet_report.failed);
    assert_eq!(dry_report.skipped, wet_report.skipped);
    assert_eq!(dry_report.success.len(), wet_report.success.len());
    assert_eq!(dry_report.success[0].units, wet_report.success[0].units);
    assert_eq!(dry_report.success.len(), 1);
    let failed: Vec<&str> = dry_report.failed.iter().map(|n| n.item.as_str()).collect();
    assert_eq!(failed, ["C02", "C03"]);

    assert_eq!(snapshot(dry.dir.path()), before);
    assert_ne!(snapshot(wet.dir.path()).len(), before.len());
}

#[test]
fn batch_preconditions_are_fatal() {
    let study = Study::new(TABLE);
    let mut cfg = study.config.clone();
    cfg.paths.pos_root = study.dir.path().join("no-such-dir");
    let err = attach_headshapes(&["C01"], &study.table(), &cfg, FsEffects::new(true)).unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));

    let no_ibbid = Study::new("megid\trandval\nC01\t0\n");
    let err = attach_headshapes(&["C01"], &no_ibbid.table(), &no_ibbid.config, FsEffects::new(true))
        .unwrap_err();
    assert!(matches!(err, Error::Validation(_)));

    let no_key = Study::new("name\tibbid\nx\tA1\n");
    let err = attach_headshapes(&["C01"], &no_key.table(), &no_key.config, FsEffects::new(true))
        .unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
}

#[test]
fn face_scans_are_avoided_when_possible() {
    let study = Study::new(TABLE);
    let pos_root = &study.config.paths.pos_root;
    let head = study.write_pos("A3122_head.pos", POS_CM);
    let face = study.write_pos("A3122_FACE.pos", POS_CM);
    set_mtime(&head, 1_000);
    set_mtime(&face, 2_000);

    assert_eq!(select_point_file("A3122", pos_root, true).unwrap(), Some(head.clone()));
    assert_eq!(select_point_file("A3122", pos_root, false).unwrap(), Some(face.clone()));

    // only face scans: fall back to them
    std::fs::remove_file(&head).unwrap();
    assert_eq!(select_point_file("A3122", pos_root, true).unwrap(), Some(face));
    assert_eq!(select_point_file("A9999", pos_root, true).unwrap(), None);
}

#[test]
fn newest_candidate_wins_ties_by_name() {
    let study = Study::new(TABLE);
    let pos_root = &study.config.paths.pos_root;
    let a = study.write_pos("A3122_a.pos", POS_CM);
    let b = study.write_pos("A3122_b.pos", POS_CM);
    let old = study.write_pos("A3122_0.pos", POS_CM);
    set_mtime(&a, 5_000);
    set_mtime(&b, 5_000);
    set_mtime(&old, 10);
    assert_eq!(select_point_file("A3122", pos_root, true).unwrap(), Some(b));
}
