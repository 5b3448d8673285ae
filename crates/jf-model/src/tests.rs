//! Cross-module tests of the combined loss function.

use crate::correction::{BoundCorrection, Std2P, create_correction};
use crate::input::{GraphData, MultijetData, SystematicShift};
use crate::loss::CombinedLossFunction;
use crate::measurement::{
    CorrectionConstraint, Measurement, MultijetBalance, MultijetConfig, PhotonJet,
    PhotonJetConfig, SATURATED_CHI2,
};
use crate::nuisance::{NuisanceRegistry, Nuisances};
use approx::assert_relative_eq;
use jf_core::{ChiSquareModel, Error};

/// Measurement with no data points.
struct Empty;

impl Measurement for Empty {
    fn label(&self) -> &str {
        "empty"
    }

    fn dimension(&self) -> usize {
        0
    }

    fn eval(&self, _: &BoundCorrection<'_>, _: &Nuisances<'_>) -> f64 {
        0.0
    }

    fn nuisance_indices(&self) -> Vec<(String, usize)> {
        Vec::new()
    }
}

/// Measurement reading a nuisance it never declared.
struct Rogue;

impl Measurement for Rogue {
    fn label(&self) -> &str {
        "rogue"
    }

    fn dimension(&self) -> usize {
        1
    }

    fn eval(&self, _: &BoundCorrection<'_>, _: &Nuisances<'_>) -> f64 {
        0.0
    }

    fn nuisance_indices(&self) -> Vec<(String, usize)> {
        vec![("Undeclared".to_string(), 0)]
    }
}

fn photon_graph() -> GraphData {
    GraphData {
        x: vec![60.0, 120.0, 240.0, 480.0],
        y: vec![0.97, 0.985, 1.0, 1.01],
        y_err: vec![0.01, 0.008, 0.01, 0.02],
    }
}

fn multijet_data() -> MultijetData {
    MultijetData {
        pt_lead: vec![300.0, 600.0, 1200.0],
        pt_recoil: vec![100.0, 150.0, 250.0],
        balance_data: vec![0.99, 1.0, 1.01],
        unc_data: vec![0.005, 0.007, 0.02],
        balance_sim: vec![1.0, 1.0, 1.0],
        unc_sim: vec![0.004, 0.004, 0.01],
        systematics: vec![SystematicShift {
            name: "JER".into(),
            up: vec![0.01, 0.01, 0.01],
            down: vec![-0.01, -0.01, -0.01],
        }],
    }
}

#[test]
fn test_parameter_layout() {
    let mut registry = NuisanceRegistry::new();
    let pj = PhotonJet::new(&photon_graph(), &PhotonJetConfig::default(), &mut registry).unwrap();
    let mj = MultijetBalance::new(&multijet_data(), &MultijetConfig::default(), &mut registry)
        .unwrap();

    let mut loss = CombinedLossFunction::new(Box::new(Std2P::new()), registry);
    loss.add_measurement(&pj).unwrap();
    loss.add_measurement(&mj).unwrap();

    assert_eq!(loss.n_poi(), 2);
    assert_eq!(loss.n_params(), 4);
    assert_eq!(loss.parameter_names(), vec!["p0", "p1", "PhotonScale", "JER"]);
    assert_eq!(loss.measurement_count(), 2);
    assert_eq!(loss.ndf(), 4 + 3 - 2);
    assert!(loss.registry().is_frozen());
    assert_eq!(loss.correction().label(), "2p");
}

#[test]
fn test_zero_nuisances_give_zero_penalty() {
    let mut registry = NuisanceRegistry::new();
    registry.declare("A").unwrap();
    registry.declare("B").unwrap();
    let loss = CombinedLossFunction::new(Box::new(Std2P::new()), registry);
    assert_eq!(loss.nuisance_penalty(&[0.3, -0.1, 0.0, 0.0]).unwrap(), 0.0);
    assert_relative_eq!(loss.nuisance_penalty(&[0.3, -0.1, 1.0, -2.0]).unwrap(), 5.0);
    // No measurements: the total is the penalty alone.
    assert_relative_eq!(loss.eval(&[0.3, -0.1, 1.0, -2.0]).unwrap(), 5.0);
}

#[test]
fn test_sum_of_terms() {
    let mut registry = NuisanceRegistry::new();
    let pj = PhotonJet::new(&photon_graph(), &PhotonJetConfig::default(), &mut registry).unwrap();
    let constraint = CorrectionConstraint::from_spec("208,1.0,0.01").unwrap();

    let mut loss = CombinedLossFunction::new(Box::new(Std2P::new()), registry);
    loss.add_measurement(&pj).unwrap();
    loss.add_measurement(&constraint).unwrap();

    let params = [0.01, 0.005, 0.5];
    let corr = Std2P::new();
    let bound = BoundCorrection::new(&corr, &params[..2]).unwrap();
    let nuis = Nuisances::new(&params[2..]);
    let expected = pj.eval(&bound, &nuis) + constraint.eval(&bound, &nuis) + 0.25;
    assert_relative_eq!(loss.eval(&params).unwrap(), expected, epsilon = 1e-12);
}

#[test]
fn test_zero_dimension_measurement_changes_nothing() {
    let constraint = CorrectionConstraint::new(200.0, 1.0, 0.01).unwrap();
    let empty = Empty;

    let mut without = CombinedLossFunction::new(Box::new(Std2P::new()), NuisanceRegistry::new());
    without.add_measurement(&constraint).unwrap();

    let mut with = CombinedLossFunction::new(Box::new(Std2P::new()), NuisanceRegistry::new());
    with.add_measurement(&constraint).unwrap();
    with.add_measurement(&empty).unwrap();

    let params = [0.02, -0.01];
    assert_eq!(with.eval(&params).unwrap(), without.eval(&params).unwrap());
    assert_eq!(with.ndf(), without.ndf());
    assert_eq!(with.ndf(), -1);
}

#[test]
fn test_eval_is_bitwise_repeatable() {
    let mut registry = NuisanceRegistry::new();
    let pj = PhotonJet::new(&photon_graph(), &PhotonJetConfig::default(), &mut registry).unwrap();
    let mj = MultijetBalance::new(&multijet_data(), &MultijetConfig::default(), &mut registry)
        .unwrap();
    let mut loss = CombinedLossFunction::new(create_correction("spline").unwrap(), registry);
    loss.add_measurement(&pj).unwrap();
    loss.add_measurement(&mj).unwrap();

    let params = [0.01, -0.02, 0.005, 0.0, 0.03, 0.4, -1.3];
    let first = loss.eval(&params).unwrap();
    for _ in 0..5 {
        assert_eq!(loss.eval(&params).unwrap().to_bits(), first.to_bits());
    }
}

#[test]
fn test_unknown_nuisance_rejected() {
    let rogue = Rogue;
    let mut loss = CombinedLossFunction::new(Box::new(Std2P::new()), NuisanceRegistry::new());
    match loss.add_measurement(&rogue) {
        Err(Error::UnknownName(name)) => assert_eq!(name, "Undeclared"),
        other => panic!("expected UnknownName, got {other:?}"),
    }
    assert_eq!(loss.measurement_count(), 0);
}

#[test]
fn test_measurement_built_against_other_registry_rejected() {
    let mut built_with = NuisanceRegistry::new();
    built_with.declare("Other").unwrap();
    let mj = MultijetBalance::new(&multijet_data(), &MultijetConfig::default(), &mut built_with)
        .unwrap();
    assert_eq!(mj.nuisance_indices(), vec![("JER".to_string(), 1)]);

    let mut registry = NuisanceRegistry::new();
    registry.declare("JER").unwrap();
    let mut loss = CombinedLossFunction::new(Box::new(Std2P::new()), registry);
    assert!(matches!(loss.add_measurement(&mj), Err(Error::Validation(_))));
    assert_eq!(loss.measurement_count(), 0);
}

#[test]
fn test_shared_nuisance_has_one_slot() {
    let mut data = multijet_data();
    data.systematics[0].name = "PhotonScale".into();

    let mut registry = NuisanceRegistry::new();
    let pj = PhotonJet::new(&photon_graph(), &PhotonJetConfig::default(), &mut registry).unwrap();
    let mj = MultijetBalance::new(&data, &MultijetConfig::default(), &mut registry).unwrap();
    assert_eq!(registry.len(), 1);
    assert_eq!(pj.nuisance_indices(), mj.nuisance_indices());

    let mut loss = CombinedLossFunction::new(Box::new(Std2P::new()), registry);
    loss.add_measurement(&pj).unwrap();
    loss.add_measurement(&mj).unwrap();
    assert_eq!(loss.n_params(), loss.n_poi() + 1);
    assert_eq!(loss.parameter_names(), vec!["p0", "p1", "PhotonScale"]);

    let corr = Std2P::new();
    let poi = [0.01, 0.0];
    let bound = BoundCorrection::new(&corr, &poi).unwrap();
    let nominal = Nuisances::new(&[0.0]);
    let shifted = Nuisances::new(&[0.5]);
    assert_ne!(pj.eval(&bound, &nominal), pj.eval(&bound, &shifted));
    assert_ne!(mj.eval(&bound, &nominal), mj.eval(&bound, &shifted));

    let expected = pj.eval(&bound, &shifted) + mj.eval(&bound, &shifted) + 0.25;
    assert_relative_eq!(loss.eval(&[0.01, 0.0, 0.5]).unwrap(), expected, epsilon = 1e-12);
}

#[test]
fn test_wrong_length_is_validation_error() {
    let loss = CombinedLossFunction::new(Box::new(Std2P::new()), NuisanceRegistry::new());
    assert!(matches!(loss.eval(&[0.0]), Err(Error::Validation(_))));
    assert!(matches!(loss.eval(&[0.0, 0.0, 0.0]), Err(Error::Validation(_))));
}

#[test]
fn test_pathological_correction_saturates() {
    let mut registry = NuisanceRegistry::new();
    let pj = PhotonJet::new(&photon_graph(), &PhotonJetConfig::default(), &mut registry).unwrap();
    let mut loss = CombinedLossFunction::new(Box::new(Std2P::new()), registry);
    loss.add_measurement(&pj).unwrap();

    let value = loss.eval(&[-1.0, 0.0, 0.0]).unwrap();
    assert!(value.is_finite());
    assert!(value >= SATURATED_CHI2);
}

#[test]
fn test_chi_square_model_impl() {
    let constraint = CorrectionConstraint::new(200.0, 1.0, 0.01).unwrap();
    let mut loss = CombinedLossFunction::new(Box::new(Std2P::new()), NuisanceRegistry::new());
    loss.add_measurement(&constraint).unwrap();

    let model: &dyn ChiSquareModel = &loss;
    assert_eq!(model.n_params(), 2);
    assert_eq!(model.n_poi(), 2);
    assert_eq!(model.ndf(), -1);
    assert_relative_eq!(model.chi2(&[0.01, 0.0]).unwrap(), 1.0, epsilon = 1e-9);
}
