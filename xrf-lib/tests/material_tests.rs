mod common;

use std::collections::BTreeMap;

use approx::assert_relative_eq;
use xrf::{Layer, Material, XrfError};

fn steel() -> Material {
    let mut steel = Material::new("Steel", 7.9, 0.01, "low alloy").unwrap();
    steel
        .set_composition_from_lists(&["Fe", "Ni"], &[7.0, 3.0])
        .unwrap();
    steel
}

#[test]
fn test_material_attenuation_matches_formula() {
    let elements = common::elements();
    let quartz = Material::from_formula("SiO2", 2.65, 0.0)
        .unwrap()
        .with_database(elements.clone());
    let energies = [2.0, 8.0, 30.0];
    let mu = quartz.mass_attenuation_coefficients(&energies).unwrap();
    let formula = elements.mass_attenuation_coefficients("SiO2", &energies).unwrap();
    for i in 0..energies.len() {
        assert_relative_eq!(mu.total[i], formula.total[i], max_relative = 1e-12);
        assert_relative_eq!(mu.coherent[i], formula.coherent[i], max_relative = 1e-12);
    }
}

#[test]
fn test_material_named_by_formula() {
    let elements = common::elements();
    let mut water = Material::new("H2O", 1.0, 0.0, "").unwrap();
    assert!(matches!(
        water.mass_attenuation_coefficients(&[10.0]),
        Err(XrfError::MissingDatabase(_))
    ));
    water.set_database(elements.clone());
    let composition = water.elemental_composition(&[]).unwrap();
    assert_eq!(composition.keys().collect::<Vec<_>>(), ["H", "O"]);
    assert!(water.mass_attenuation_coefficients(&[10.0]).unwrap().total[0] > 0.0);
}

#[test]
fn test_user_material_composition() {
    let elements = common::elements();
    let materials = vec![steel()];
    let composition = elements.composition("Steel", &materials).unwrap();
    assert_relative_eq!(composition["Fe"], 0.7, max_relative = 1e-12);
    assert_relative_eq!(composition["Ni"], 0.3, max_relative = 1e-12);
}

#[test]
fn test_nested_materials() {
    let elements = common::elements();
    let mut coated = Material::new("Coated", 5.0, 0.0, "").unwrap();
    coated
        .set_composition_from_lists(&["Steel", "SiO2"], &[1.0, 1.0])
        .unwrap();
    let materials = vec![steel(), coated];

    let composition = elements.composition("Coated", &materials).unwrap();
    let quartz = elements.composition("SiO2", &[]).unwrap();
    assert_relative_eq!(composition["Fe"], 0.35, max_relative = 1e-12);
    assert_relative_eq!(composition["Ni"], 0.15, max_relative = 1e-12);
    assert_relative_eq!(composition["Si"], 0.5 * quartz["Si"], max_relative = 1e-12);
    let total: f64 = composition.values().sum();
    assert_relative_eq!(total, 1.0, max_relative = 1e-12);
}

#[test]
fn test_nested_material_attenuation() {
    let elements = common::elements();
    let mut coated = Material::new("Coated", 5.0, 0.0, "")
        .unwrap()
        .with_database(elements.clone());
    coated
        .set_composition_from_lists(&["Steel", "SiO2"], &[1.0, 1.0])
        .unwrap();
    let energies = [5.0, 20.0];
    assert!(matches!(
        coated.mass_attenuation_coefficients(&energies),
        Err(XrfError::InvalidFormula(_))
    ));

    let materials = vec![steel()];
    let mu = coated
        .mass_attenuation_coefficients_with_materials(&energies, &materials)
        .unwrap();
    let composition = coated.elemental_composition(&materials).unwrap();
    let expected = elements
        .composition_mass_attenuation(&composition, &energies)
        .unwrap();
    for i in 0..energies.len() {
        assert_relative_eq!(mu.total[i], expected.total[i], max_relative = 1e-12);
    }
}

#[test]
fn test_non_finite_amounts_are_rejected() {
    let elements = common::elements();
    for amount in [f64::NAN, f64::INFINITY, -1.0] {
        let composition = BTreeMap::from([("Fe".to_string(), amount), ("O".to_string(), 1.0)]);
        assert!(
            matches!(
                elements.normalized_composition(&composition, &[]),
                Err(XrfError::InvalidMaterial(_))
            ),
            "amount {amount}"
        );
    }
}

#[test]
fn test_circular_materials() {
    let elements = common::elements();
    let mut a = Material::new("Alpha", 1.0, 0.0, "").unwrap();
    a.set_composition_from_lists(&["Beta"], &[1.0]).unwrap();
    let mut b = Material::new("Beta", 1.0, 0.0, "").unwrap();
    b.set_composition_from_lists(&["Alpha"], &[1.0]).unwrap();
    assert!(matches!(
        elements.composition("Alpha", &[a, b]),
        Err(XrfError::InvalidMaterial(_))
    ));
}

#[test]
fn test_unknown_material() {
    let elements = common::elements();
    assert!(matches!(
        elements.composition("Unobtainium", &[]),
        Err(XrfError::InvalidFormula(_))
    ));
    assert!(matches!(
        elements.mass_attenuation_coefficients("Fe2(O", &[10.0]),
        Err(XrfError::InvalidFormula(_))
    ));
}

#[test]
fn test_layer_transmission() {
    let elements = common::elements();
    let layer = Layer::new("Fe", 7.87, 0.001, 1.0).unwrap();
    let energies = [5.0, 10.0];
    let mu = elements.mass_attenuation_coefficients("Fe", &energies).unwrap();

    let normal = layer.transmission(&energies, &elements, &[], 90.0).unwrap();
    let grazing = layer.transmission(&energies, &elements, &[], 30.0).unwrap();
    for i in 0..energies.len() {
        assert_relative_eq!(
            normal[i],
            (-mu.total[i] * 7.87 * 0.001).exp(),
            max_relative = 1e-12
        );
        assert_relative_eq!(grazing[i], normal[i].powi(2), max_relative = 1e-9);
    }
}

#[test]
fn test_layer_of_user_material() {
    let elements = common::elements();
    let materials = vec![steel()];
    let named = Layer::new("Steel", 7.9, 0.01, 1.0).unwrap();
    let inline = Layer::from_material(steel()).unwrap();
    assert_eq!(inline.thickness(), 0.01);
    assert!(named.composition(&elements, &[]).is_err());

    let a = named.transmission(&[12.0], &elements, &materials, 90.0).unwrap();
    let b = inline.transmission(&[12.0], &elements, &[], 90.0).unwrap();
    assert_relative_eq!(a[0], b[0], max_relative = 1e-12);
}

#[test]
fn test_layer_peak_families() {
    let elements = common::elements();
    let layer = Layer::new("FeNi", 8.0, 0.001, 1.0).unwrap();
    let families = layer.peak_families(10.0, &elements, &[]).unwrap();
    let names: Vec<&str> = families.iter().map(|(n, _)| n.as_str()).collect();
    assert!(names.contains(&"Fe K"));
    assert!(names.contains(&"Ni K"));
    assert!(names.contains(&"Ni L3"));
}
