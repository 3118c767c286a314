mod common;

use approx::assert_abs_diff_eq;
use ndarray::Axis;
use register_space::subspace::ProvenanceStep;
use register_space::{
    compare_subspaces, group_summaries, rotate_pair, run_analysis, AnalysisConfig, AnalysisError,
    LdaConfig, SizeFilter, Which,
};

fn config() -> AnalysisConfig {
    AnalysisConfig {
        lda_levels: vec!["cat4".to_owned(), "cat2".to_owned()],
        ..AnalysisConfig::default()
    }
}

#[test]
fn full_run_filters_fits_aligns_and_compares() {
    let outcome = run_analysis(common::features(11), common::metadata(), &common::taxonomy(), &config()).unwrap();

    let report = &outcome.filter_report;
    assert_eq!(report.kept, 108);
    assert_eq!(report.excluded_ids.len(), 12);
    assert_eq!(report.per_group["GB"].excluded, 12);
    assert_eq!(report.per_group["GB"].total, 60);
    assert_eq!(report.per_group["IND"].excluded, 0);
    assert_eq!(outcome.dropped_features, vec!["constant".to_owned()]);

    let bundle = &outcome.bundle;
    assert_eq!(bundle.ids.len(), 108);
    assert_eq!(bundle.ids[0], common::doc_id(1));
    assert_eq!(bundle.feature_names.len(), 5);
    assert!(bundle.metadata.ids().eq(bundle.ids.iter().map(String::as_str)));
    for column in bundle.zscores.values().axis_iter(Axis(1)) {
        assert_abs_diff_eq!(column.mean().unwrap(), 0.0, epsilon = 1e-10);
        assert_abs_diff_eq!(column.std(1.0), 1.0, epsilon = 1e-10);
    }

    assert_eq!(bundle.pca.n_dims(), 5);
    assert_eq!(bundle.lda.iter().map(|s| s.n_dims()).collect::<Vec<_>>(), vec![3, 1]);
    for subspace in bundle.lda.iter().chain(&bundle.aligned_lda) {
        assert!(subspace.is_orthonormal(1e-9));
    }
    assert_eq!(bundle.aligned_lda.len(), 2);
    assert!(bundle.aligned_lda.iter().all(|s| s.n_dims() == 1));
    assert_eq!(bundle.render_configs[0].order, vec!["A1", "A2", "B1", "B2"]);
    assert_eq!(bundle.render_configs[1].order, vec!["A", "B"]);

    let reference = &outcome.alignments[0];
    assert_eq!(reference.assignment, vec![0]);
    assert_eq!(reference.flipped, vec![false]);
    assert_abs_diff_eq!(reference.cosines[0], 1.0, epsilon = 1e-10);

    let pca_dims: Vec<usize> = outcome.pca_comparisons.iter().map(|c| c.pca_dims).collect();
    assert_eq!(pca_dims, vec![3, 1]);
    for comparison in &outcome.pca_comparisons {
        assert!(comparison.similarity.cosines.iter().all(|&c| (0.0..=1.0).contains(&c)));
    }
    assert_eq!(outcome.level_comparisons.len(), 1);
    assert_eq!(outcome.level_comparisons[0].first, "cat4");
    assert_eq!(outcome.level_comparisons[0].similarity.cosines.len(), 1);
}

#[test]
fn alignment_keeps_the_span_of_each_level() {
    let outcome = run_analysis(common::features(12), common::metadata(), &common::taxonomy(), &config()).unwrap();
    let bundle = &outcome.bundle;
    for (full, aligned) in bundle.lda.iter().zip(&bundle.aligned_lda) {
        let head = full.leading(aligned.n_dims()).unwrap();
        let similarity = compare_subspaces(&head, aligned).unwrap();
        for c in similarity.cosines.iter() {
            assert_abs_diff_eq!(*c, 1.0, epsilon = 1e-10);
        }
        assert!(matches!(aligned.provenance().last(), Some(ProvenanceStep::Matched { .. })));
    }
}

#[test]
fn rotating_leading_principal_components_is_a_no_op() {
    let outcome = run_analysis(common::features(13), common::metadata(), &common::taxonomy(), &config()).unwrap();
    let bundle = &outcome.bundle;
    let rotated = rotate_pair(&bundle.pca, &bundle.transformed, 0, 1).unwrap();
    match rotated.provenance().last() {
        Some(ProvenanceStep::PairRotated { angle_radians, .. }) => assert!(angle_radians.abs() < 1e-8),
        other => panic!("unexpected provenance {:?}", other),
    }
}

#[test]
fn projections_feed_group_summaries() {
    let outcome = run_analysis(common::features(14), common::metadata(), &common::taxonomy(), &config()).unwrap();
    let bundle = &outcome.bundle;
    let projection = bundle.lda[0].project(&bundle.transformed, Which::Both).unwrap();
    let summaries = group_summaries(&projection, &bundle.groupings[0], 0).unwrap();
    assert_eq!(summaries.len(), 4);
    assert_eq!(summaries.iter().map(|s| s.n).sum::<usize>(), 108);
    for (summary, class) in summaries.iter().zip(common::FINE) {
        assert_eq!(summary.class, class);
        assert!(summary.min <= summary.q1 && summary.q1 <= summary.median);
        assert!(summary.median <= summary.q3 && summary.q3 <= summary.max);
    }
}

#[test]
fn default_levels_cover_the_whole_taxonomy() {
    let outcome = run_analysis(
        common::features(15),
        common::metadata(),
        &common::taxonomy(),
        &AnalysisConfig::default(),
    )
    .unwrap();
    let levels: Vec<&str> = outcome.alignments.iter().map(|a| a.level.as_str()).collect();
    assert_eq!(levels, vec!["cat2", "cat4"]);
    assert_eq!(outcome.bundle.config, AnalysisConfig::default());
}

#[test]
fn data_integrity_problems_abort_the_run() {
    let mut metadata = common::metadata();
    metadata.retain(|m| m.id != common::doc_id(7));
    let err = run_analysis(common::features(1), metadata, &common::taxonomy(), &config()).unwrap_err();
    assert!(matches!(err, AnalysisError::MissingMetadata { ref ids } if ids == &vec![common::doc_id(7)]));
    assert!(err.is_data_integrity());

    let mut metadata = common::metadata();
    metadata[3].categories.insert("cat4".to_owned(), "Z9".to_owned());
    let err = run_analysis(common::features(1), metadata, &common::taxonomy(), &config()).unwrap_err();
    assert!(matches!(err, AnalysisError::UnknownCategory { ref code, .. } if code == "Z9"));
}

#[test]
fn impossible_settings_are_rejected() {
    let strict = AnalysisConfig {
        filter: SizeFilter { min_words: 10_000, ..SizeFilter::default() },
        ..config()
    };
    assert!(matches!(
        run_analysis(common::features(2), common::metadata(), &common::taxonomy(), &strict),
        Err(AnalysisError::InvalidParameter(_))
    ));

    let too_many = AnalysisConfig {
        lda: LdaConfig { n_dims: Some(2), ..LdaConfig::default() },
        ..config()
    };
    let err = run_analysis(common::features(2), common::metadata(), &common::taxonomy(), &too_many).unwrap_err();
    assert!(err.is_dimensionality());

    let unknown_level = AnalysisConfig {
        lda_levels: vec!["cat99".to_owned()],
        ..config()
    };
    assert!(run_analysis(common::features(2), common::metadata(), &common::taxonomy(), &unknown_level).is_err());
}
