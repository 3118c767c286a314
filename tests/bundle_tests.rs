mod common;

use ndarray::{s, Array2};
use register_space::{run_analysis, AnalysisBundle, AnalysisConfig, AnalysisError, CategoryGrouping, FeatureMatrix};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::{BufWriter, Write};
use tempfile::{tempdir, NamedTempFile};

fn bundle() -> AnalysisBundle {
    let config = AnalysisConfig {
        lda_levels: vec!["cat4".to_owned(), "cat2".to_owned()],
        ..AnalysisConfig::default()
    };
    run_analysis(common::features(21), common::metadata(), &common::taxonomy(), &config)
        .unwrap()
        .bundle
}

/// Field-for-field stand-ins used to build values that skip the constructors' checks.
#[derive(Serialize)]
struct RawMatrix {
    ids: Vec<String>,
    feature_names: Vec<String>,
    values: Array2<f64>,
}

#[derive(Serialize)]
struct RawGrouping {
    level: String,
    classes: Vec<String>,
    labels: Vec<String>,
    assignments: Vec<usize>,
}

fn reinterpret<A: Serialize, B: DeserializeOwned>(value: &A) -> B {
    let bytes = bincode::serde::encode_to_vec(value, bincode::config::standard()).unwrap();
    bincode::serde::decode_from_slice(&bytes, bincode::config::standard()).unwrap().0
}

fn write_unchecked(bundle: &AnalysisBundle, path: &std::path::Path) {
    let mut writer = BufWriter::new(std::fs::File::create(path).unwrap());
    bincode::serde::encode_into_std_write(bundle, &mut writer, bincode::config::standard()).unwrap();
    writer.flush().unwrap();
}

#[test]
fn bundle_survives_a_save_load_cycle() {
    let original = bundle();
    let dir = tempdir().unwrap();
    let path = dir.path().join("analysis.bin");

    original.save(&path).unwrap();
    let loaded = AnalysisBundle::load(&path).unwrap();
    assert_eq!(loaded, original);
    assert_eq!(loaded.lda[0].provenance(), original.lda[0].provenance());
}

#[test]
fn inconsistent_bundles_are_not_written() {
    let mut broken = bundle();
    broken.ids.swap(0, 1);
    let dir = tempdir().unwrap();
    let path = dir.path().join("broken.bin");
    assert!(matches!(broken.save(&path), Err(AnalysisError::ShapeMismatch(_))));
    assert!(!path.exists());

    let mut broken = bundle();
    broken.render_configs.pop();
    assert!(broken.validate().is_err());

    let mut broken = bundle();
    broken.feature_names[0] = "renamed".to_owned();
    assert!(broken.validate().is_err());
}

#[test]
fn garbage_and_missing_files_fail_to_load() {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(b"definitely not a bundle").unwrap();
    file.flush().unwrap();
    assert!(matches!(
        AnalysisBundle::load(file.path()),
        Err(AnalysisError::Serialization(_))
    ));

    let dir = tempdir().unwrap();
    assert!(matches!(
        AnalysisBundle::load(dir.path().join("absent.bin")),
        Err(AnalysisError::Io(_))
    ));
}

#[test]
fn malformed_matrices_are_rejected_on_save_and_load() {
    let original = bundle();
    let mut broken = original.clone();
    // Identifiers and names are intact but the values lose their last column.
    let values = original.zscores.values().slice(s![.., ..original.feature_names.len() - 1]).to_owned();
    broken.zscores = reinterpret::<_, FeatureMatrix>(&RawMatrix {
        ids: original.ids.clone(),
        feature_names: original.feature_names.clone(),
        values,
    });

    let dir = tempdir().unwrap();
    let path = dir.path().join("short.bin");
    assert!(matches!(broken.save(&path), Err(AnalysisError::ShapeMismatch(_))));
    assert!(!path.exists());

    write_unchecked(&broken, &path);
    assert!(matches!(AnalysisBundle::load(&path), Err(AnalysisError::ShapeMismatch(_))));
}

#[test]
fn out_of_range_class_assignments_are_rejected() {
    let original = bundle();
    let grouping = &original.groupings[0];
    let mut assignments = grouping.assignments().to_vec();
    assignments[0] = grouping.n_classes() + 7;
    let mut broken = original.clone();
    broken.groupings[0] = reinterpret::<_, CategoryGrouping>(&RawGrouping {
        level: grouping.level().to_owned(),
        classes: grouping.classes().to_vec(),
        labels: grouping.labels().to_vec(),
        assignments,
    });
    assert!(matches!(broken.validate(), Err(AnalysisError::ShapeMismatch(_))));

    let dir = tempdir().unwrap();
    let path = dir.path().join("assignments.bin");
    write_unchecked(&broken, &path);
    assert!(matches!(AnalysisBundle::load(&path), Err(AnalysisError::ShapeMismatch(_))));
}

#[test]
fn non_positive_or_non_finite_scales_are_rejected() {
    let original = bundle();
    for bad in [0.0, -1.0, f64::NAN, f64::INFINITY] {
        let mut broken = original.clone();
        broken.scaling.scale[0] = bad;
        assert!(
            matches!(broken.validate(), Err(AnalysisError::InvalidParameter(_))),
            "scale {} was accepted",
            bad
        );
    }
    let mut broken = original;
    broken.scaling.mean[1] = f64::NAN;
    assert!(matches!(broken.validate(), Err(AnalysisError::InvalidParameter(_))));
}
