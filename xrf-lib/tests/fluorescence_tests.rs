mod common;

use approx::assert_relative_eq;
use xrf::{
    Beam, Detector, ExcitationOrder, FluorescenceOptions, FluorescenceRequest, Layer,
    MultilayerFluorescence, TransmissionTable, XrfError, XrfSolver,
};

fn requests(texts: &[&str]) -> Vec<FluorescenceRequest> {
    texts.iter().map(|t| t.parse().unwrap()).collect()
}

fn iron_solver() -> XrfSolver {
    let mut solver = XrfSolver::new();
    solver.set_geometry(45.0, 45.0, None).unwrap();
    solver.set_single_energy_beam(20.0, 0.0).unwrap();
    solver.set_single_layer_sample("Fe", 7.87, 0.001).unwrap();
    solver
}

fn two_layer_solver() -> XrfSolver {
    let mut solver = XrfSolver::new();
    solver.set_geometry(45.0, 45.0, None).unwrap();
    solver.set_single_energy_beam(20.0, 0.0).unwrap();
    solver
        .set_sample(
            vec![
                Layer::new("Fe", 7.87, 0.0005, 1.0).unwrap(),
                Layer::new("Ni", 8.9, 0.002, 1.0).unwrap(),
            ],
            0,
        )
        .unwrap();
    solver
}

fn run(solver: &XrfSolver, texts: &[&str], order: ExcitationOrder) -> MultilayerFluorescence {
    let elements = common::elements();
    solver
        .multilayer_fluorescence(
            &requests(texts),
            &elements,
            &FluorescenceOptions::with_order(order),
        )
        .unwrap()
}

#[test]
fn test_primary_closed_form() {
    let elements = common::elements();
    let output = run(&iron_solver(), &["Fe K"], ExcitationOrder::Primary);
    let kl3 = &output["Fe K"][&0]["KL3"];

    let factors = elements.excitation_factors("Fe", 20.0, 1.0).unwrap();
    let mu = elements
        .mass_attenuation_coefficients("Fe", &[20.0, factors["KL3"].energy])
        .unwrap()
        .total;
    let sin = 45.0_f64.to_radians().sin();
    let mass_thickness = 7.87 * 0.001;
    let t = mu[0] / sin + mu[1] / sin;
    let expected = (1.0 - (-t * mass_thickness).exp()) / t / sin * factors["KL3"].rate;

    assert_relative_eq!(kl3.primary, expected, max_relative = 1e-10);
    assert_eq!(kl3.secondary, 0.0);
    assert_eq!(kl3.efficiency, 1.0);
    assert_eq!(kl3.rate, kl3.primary);
    assert_eq!(kl3.mass_fraction, 1.0);
    assert_eq!(kl3.energy, factors["KL3"].energy);
    assert_eq!(kl3.energy_threshold, common::binding_energy(26, "K"));
    assert_relative_eq!(kl3.mu_1_i, mu[1], max_relative = 1e-12);
}

#[test]
fn test_beam_below_threshold_gives_no_lines() {
    let mut solver = iron_solver();
    solver.set_single_energy_beam(7.0, 0.0).unwrap();
    let output = run(&solver, &["Fe K"], ExcitationOrder::Secondary);
    assert!(output["Fe K"].is_empty());
}

#[test]
fn test_secondary_from_layer_below() {
    let solver = two_layer_solver();
    let primary = run(&solver, &["Fe K"], ExcitationOrder::Primary);
    let secondary = run(&solver, &["Fe K"], ExcitationOrder::Secondary);

    let kl3 = &secondary["Fe K"][&0]["KL3"];
    assert!(kl3.secondary > 0.0);
    assert!(kl3.contributions["Ni KL3 01"] > 0.0);
    assert!(kl3.contributions["coherent scattering 00"] > 0.0);
    assert_eq!(kl3.primary, primary["Fe K"][&0]["KL3"].primary);
    assert_eq!(kl3.tertiary, 0.0);

    let total: f64 = kl3.contributions.values().sum();
    assert_relative_eq!(total, kl3.secondary, max_relative = 1e-12);
    assert_relative_eq!(
        kl3.rate,
        (kl3.primary + kl3.secondary) * kl3.efficiency,
        max_relative = 1e-12
    );
    // Fe is only present in the top layer
    assert!(!secondary["Fe K"].contains_key(&1));
}

#[test]
fn test_lower_layer_is_shielded() {
    let solver = two_layer_solver();
    let elements = common::elements();
    let output = run(&solver, &["Ni K"], ExcitationOrder::Primary);
    let kl3 = &output["Ni K"][&1]["KL3"];
    let top = Layer::new("Fe", 7.87, 0.0005, 1.0).unwrap();
    let exit = top
        .transmission(&[kl3.energy], &elements, &[], 45.0)
        .unwrap()[0];
    assert_relative_eq!(kl3.efficiency, exit, max_relative = 1e-12);
}

#[test]
fn test_tertiary_from_secondary_enhancement() {
    let mut solver = XrfSolver::new();
    solver.set_geometry(45.0, 45.0, None).unwrap();
    solver.set_single_energy_beam(20.0, 0.0).unwrap();
    solver.set_single_layer_sample("FeNiZn", 8.0, 0.002).unwrap();
    let texts = ["Fe K", "Ni K", "Zn K"];
    let secondary = run(&solver, &texts, ExcitationOrder::Secondary);
    let tertiary = run(&solver, &texts, ExcitationOrder::Tertiary);

    let enhancement = |key: &str, line: &str| {
        let line = &secondary[key][&0][line];
        (line.primary + line.secondary) / line.primary
    };
    let fe = &secondary["Fe K"][&0]["KL3"];
    assert!(enhancement("Fe K", "KL3") > 1.01);

    let mut expected = 0.0;
    for (source, value) in &fe.contributions {
        let parts: Vec<&str> = source.split(' ').collect();
        let [element, line, "00"] = parts.as_slice() else {
            continue;
        };
        let key = format!("{element} K");
        if secondary.get(&key).is_some_and(|l| l[&0].contains_key(*line)) {
            let factor = enhancement(key.as_str(), *line);
            if factor >= 1.01 {
                expected += value * (factor - 1.0);
            }
        }
    }
    assert!(expected > 0.0);

    let result = &tertiary["Fe K"][&0]["KL3"];
    assert_eq!(result.primary, fe.primary);
    assert_eq!(result.secondary, fe.secondary);
    assert_relative_eq!(result.tertiary, expected, max_relative = 1e-12);
    let emitted = fe.primary + fe.secondary;
    assert_relative_eq!(
        result.rate,
        fe.rate * (emitted + expected) / emitted,
        max_relative = 1e-12
    );
}

#[test]
fn test_repeated_calls_are_identical() {
    let mut solver = two_layer_solver();
    let beam = Beam::new(&[12.0, 15.0, 20.0, 30.0], &[1.0, 2.0, 1.0, 0.5], &[], &[]).unwrap();
    solver.set_beam(beam);
    let texts = ["Fe", "Ni K"];
    let first = run(&solver, &texts, ExcitationOrder::Tertiary);
    let second = run(&solver, &texts, ExcitationOrder::Tertiary);
    assert_eq!(first, second);
}

#[test]
fn test_beam_weights_add_up() {
    let solver = iron_solver();
    let elements = common::elements();
    let beam = Beam::new(&[15.0, 20.0], &[1.0, 3.0], &[], &[]).unwrap();
    let options = FluorescenceOptions {
        beam: Some(beam),
        ..Default::default()
    };
    let mixed = solver
        .multilayer_fluorescence(&requests(&["Fe K"]), &elements, &options)
        .unwrap();

    let mut at_15 = iron_solver();
    at_15.set_single_energy_beam(15.0, 0.0).unwrap();
    let a = run(&at_15, &["Fe K"], ExcitationOrder::Primary)["Fe K"][&0]["KL3"].rate;
    let b = run(&solver, &["Fe K"], ExcitationOrder::Primary)["Fe K"][&0]["KL3"].rate;
    assert_relative_eq!(
        mixed["Fe K"][&0]["KL3"].rate,
        0.25 * a + 0.75 * b,
        max_relative = 1e-12
    );
}

#[test]
fn test_filters_and_attenuators() {
    let elements = common::elements();
    let reference = run(&iron_solver(), &["Fe K"], ExcitationOrder::Primary)["Fe K"][&0]["KL3"]
        .clone();

    let filter = Layer::new("Al", 2.7, 0.002, 1.0).unwrap();
    let t_beam = filter.transmission(&[20.0], &elements, &[], 90.0).unwrap()[0];
    let mut solver = iron_solver();
    solver.set_beam_filters(vec![filter]);
    let filtered = &run(&solver, &["Fe K"], ExcitationOrder::Primary)["Fe K"][&0]["KL3"];
    assert_relative_eq!(filtered.rate, reference.rate * t_beam, max_relative = 1e-12);

    let mut solver = iron_solver();
    let half = TransmissionTable::from_lists(&[1.0, 100.0], &[0.5, 0.5], "half", "").unwrap();
    solver.set_user_beam_filters(vec![half]);
    let filtered = &run(&solver, &["Fe K"], ExcitationOrder::Primary)["Fe K"][&0]["KL3"];
    assert_relative_eq!(filtered.rate, 0.5 * reference.rate, max_relative = 1e-12);

    let mut solver = iron_solver();
    let quarter = TransmissionTable::from_lists(&[1.0, 100.0], &[0.25, 0.25], "", "").unwrap();
    solver.set_user_attenuators(vec![quarter]);
    let window = Layer::new("Be", 1.85, 0.0025, 1.0).unwrap();
    let t_window = window
        .transmission(&[reference.energy], &elements, &[], 90.0)
        .unwrap()[0];
    solver.set_attenuators(vec![window]);
    let attenuated = &run(&solver, &["Fe K"], ExcitationOrder::Primary)["Fe K"][&0]["KL3"];
    assert_eq!(attenuated.primary, reference.primary);
    assert_relative_eq!(
        attenuated.efficiency,
        0.25 * t_window,
        max_relative = 1e-12
    );
    assert_relative_eq!(
        attenuated.rate,
        reference.rate * 0.25 * t_window,
        max_relative = 1e-12
    );
}

#[test]
fn test_detector_escape_peaks() {
    let elements = common::elements();
    let mut solver = iron_solver();
    let detector = Detector::new("Si", 2.33, 0.05).unwrap();
    solver.set_detector(Some(detector.clone()));
    let output = run(&solver, &["Fe K"], ExcitationOrder::Secondary);
    let lines = &output["Fe K"][&0];

    let parent = &lines["KL3"];
    let escape = &lines["KL3 Si_KL3esc"];
    assert_eq!(escape.escape_of.as_deref(), Some("KL3"));
    assert!(escape.escape_ratio > 0.0);
    assert_relative_eq!(
        escape.energy,
        parent.energy - elements.element("Si").unwrap().transition_energy("KL3"),
        max_relative = 1e-12
    );

    let detector_efficiency = detector
        .efficiency(&[parent.energy], &elements, &[])
        .unwrap()[0];
    assert_relative_eq!(parent.efficiency, detector_efficiency, max_relative = 1e-12);

    let escaped: f64 = lines
        .iter()
        .filter(|(name, _)| name.starts_with("KL3 "))
        .map(|(_, l)| l.rate)
        .sum();
    assert_relative_eq!(
        parent.rate + escaped,
        (parent.primary + parent.secondary) * parent.efficiency,
        max_relative = 1e-12
    );
}

#[test]
fn test_geometric_efficiency_scales_rate() {
    let mut solver = iron_solver();
    let mut detector = Detector::new("Si", 2.33, 0.05).unwrap();
    detector.set_diameter(1.0).unwrap();
    detector.set_distance(5.0).unwrap();
    solver.set_detector(Some(detector));
    let elements = common::elements();
    let request = requests(&["Fe K"]);

    let with = solver
        .multilayer_fluorescence(&request, &elements, &FluorescenceOptions::default())
        .unwrap();
    let options = FluorescenceOptions {
        use_geometric_efficiency: false,
        ..Default::default()
    };
    let without = solver
        .multilayer_fluorescence(&request, &elements, &options)
        .unwrap();
    assert_relative_eq!(
        with["Fe K"][&0]["KL3"].efficiency,
        without["Fe K"][&0]["KL3"].efficiency * solver.geometric_efficiency(0).unwrap(),
        max_relative = 1e-12
    );
}

#[test]
fn test_pure_element_option() {
    let elements = common::elements();
    let mut solver = iron_solver();
    solver.set_single_layer_sample("Fe2O3", 5.24, 0.001).unwrap();
    let request = requests(&["Fe K"]);
    let weighted = solver
        .multilayer_fluorescence(&request, &elements, &FluorescenceOptions::default())
        .unwrap();
    let options = FluorescenceOptions {
        use_mass_fractions: false,
        ..Default::default()
    };
    let pure = solver
        .multilayer_fluorescence(&request, &elements, &options)
        .unwrap();

    let fraction = elements.composition("Fe2O3", &[]).unwrap()["Fe"];
    let weighted = &weighted["Fe K"][&0]["KL3"];
    let pure = &pure["Fe K"][&0]["KL3"];
    assert_relative_eq!(pure.rate, weighted.rate / fraction, max_relative = 1e-12);
    assert_relative_eq!(pure.mass_fraction, fraction, max_relative = 1e-12);
}

#[test]
fn test_request_errors() {
    let elements = common::elements();
    let options = FluorescenceOptions::default();
    let solver = iron_solver();
    assert!(matches!(
        solver.multilayer_fluorescence(&requests(&["Fe K 3"]), &elements, &options),
        Err(XrfError::InvalidConfiguration(_))
    ));
    assert!(matches!(
        solver.multilayer_fluorescence(&requests(&["Xx K"]), &elements, &options),
        Err(XrfError::InvalidElement(_))
    ));

    let mut no_beam = XrfSolver::new();
    no_beam.set_single_layer_sample("Fe", 7.87, 0.001).unwrap();
    assert!(matches!(
        no_beam.multilayer_fluorescence(&requests(&["Fe K"]), &elements, &options),
        Err(XrfError::InvalidConfiguration(_))
    ));

    let mut no_sample = XrfSolver::new();
    no_sample.set_single_energy_beam(20.0, 0.0).unwrap();
    assert!(matches!(
        no_sample.multilayer_fluorescence(&requests(&["Fe K"]), &elements, &options),
        Err(XrfError::InvalidConfiguration(_))
    ));
}

#[test]
fn test_hand_built_request_with_bad_family() {
    let elements = common::elements();
    let options = FluorescenceOptions::default();
    let solver = iron_solver();
    for family in ["", "\u{e9}", "X", "k"] {
        let request = FluorescenceRequest {
            element: "Fe".to_string(),
            family: Some(family.to_string()),
            layer: None,
        };
        assert!(
            matches!(
                solver.multilayer_fluorescence(&[request], &elements, &options),
                Err(XrfError::InvalidConfiguration(_))
            ),
            "family {family:?}"
        );
    }
}

#[test]
fn test_bare_element_expands_to_families() {
    let output = run(&iron_solver(), &["Fe"], ExcitationOrder::Primary);
    assert_eq!(
        output.keys().collect::<Vec<_>>(),
        ["Fe K", "Fe L", "Fe M"]
    );
    assert!(output["Fe L"][&0].keys().all(|line| line.starts_with('L')));
    // light element without M fluorescence
    assert!(output["Fe M"].is_empty());
}

#[test]
fn test_alpha_and_beta_groups() {
    let solver = iron_solver();
    let all = run(&solver, &["Fe K"], ExcitationOrder::Primary);
    let output = run(&solver, &["Fe Ka", "Fe Kb"], ExcitationOrder::Primary);

    let ka = &output["Fe Ka"][&0];
    assert_eq!(ka.keys().collect::<Vec<_>>(), ["KL2", "KL3"]);
    let kb = &output["Fe Kb"][&0];
    assert_eq!(kb.keys().collect::<Vec<_>>(), ["KM2", "KM3"]);
    assert_relative_eq!(
        ka["KL3"].rate,
        all["Fe K"][&0]["KL3"].rate,
        max_relative = 1e-12
    );
}

#[test]
fn test_layer_restriction() {
    let mut solver = iron_solver();
    solver
        .set_sample(
            vec![
                Layer::new("Fe", 7.87, 0.0005, 1.0).unwrap(),
                Layer::new("Fe", 7.87, 0.0005, 1.0).unwrap(),
            ],
            0,
        )
        .unwrap();
    let output = run(&solver, &["Fe K 1"], ExcitationOrder::Primary);
    assert_eq!(output["Fe K"].keys().collect::<Vec<_>>(), [&1]);

    let output = run(&solver, &["Fe K 1", "Fe K 0"], ExcitationOrder::Primary);
    assert_eq!(output["Fe K"].keys().collect::<Vec<_>>(), [&0, &1]);
    let top = &output["Fe K"][&0]["KL3"];
    let bottom = &output["Fe K"][&1]["KL3"];
    assert!(bottom.rate < top.rate);

    let output = run(&solver, &["Fe K 1", "Fe K"], ExcitationOrder::Primary);
    assert_eq!(output["Fe K"].len(), 2);
}

#[test]
fn test_user_material_layer() {
    let mut steel = xrf::Material::new("Steel", 7.9, 0.001, "").unwrap();
    steel.set_composition_from_lists(&["Fe", "Ni"], &[0.7, 0.3]).unwrap();
    let mut solver = iron_solver();
    solver.set_materials(vec![steel]);
    solver.set_single_layer_sample("Steel", 7.9, 0.001).unwrap();
    let output = run(&solver, &["Fe K", "Ni K"], ExcitationOrder::Secondary);
    let fe = &output["Fe K"][&0]["KL3"];
    assert_relative_eq!(fe.mass_fraction, 0.7, max_relative = 1e-12);
    assert!(fe.contributions.contains_key("Ni KL3 00"));
}
