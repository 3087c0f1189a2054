/// Element symbols, names and standard atomic masses (g/mol), indexed by Z - 1.
pub(crate) const ELEMENTS: &[(&str, &str, f64)] = &[
    ("H", "Hydrogen", 1.00794),
    ("He", "Helium", 4.002602),
    ("Li", "Lithium", 6.941),
    ("Be", "Beryllium", 9.012182),
    ("B", "Boron", 10.811),
    ("C", "Carbon", 12.0107),
    ("N", "Nitrogen", 14.0067),
    ("O", "Oxygen", 15.9994),
    ("F", "Fluorine", 18.9984032),
    ("Ne", "Neon", 20.1797),
    ("Na", "Sodium", 22.98977),
    ("Mg", "Magnesium", 24.305),
    ("Al", "Aluminium", 26.981538),
    ("Si", "Silicon", 28.0855),
    ("P", "Phosphorus", 30.973761),
    ("S", "Sulphur", 32.065),
    ("Cl", "Chlorine", 35.453),
    ("Ar", "Argon", 39.948),
    ("K", "Potassium", 39.0983),
    ("Ca", "Calcium", 40.078),
    ("Sc", "Scandium", 44.95591),
    ("Ti", "Titanium", 47.867),
    ("V", "Vanadium", 50.9415),
    ("Cr", "Chromium", 51.9961),
    ("Mn", "Manganese", 54.938049),
    ("Fe", "Iron", 55.845),
    ("Co", "Cobalt", 58.9332),
    ("Ni", "Nickel", 58.6934),
    ("Cu", "Copper", 63.546),
    ("Zn", "Zinc", 65.409),
    ("Ga", "Gallium", 69.723),
    ("Ge", "Germanium", 72.64),
    ("As", "Arsenic", 74.9216),
    ("Se", "Selenium", 78.96),
    ("Br", "Bromine", 79.904),
    ("Kr", "Krypton", 83.798),
    ("Rb", "Rubidium", 85.4678),
    ("Sr", "Strontium", 87.62),
    ("Y", "Yttrium", 88.90585),
    ("Zr", "Zirconium", 91.224),
    ("Nb", "Niobium", 92.90638),
    ("Mo", "Molybdenum", 95.94),
    ("Tc", "Technetium", 98.0),
    ("Ru", "Ruthenium", 101.07),
    ("Rh", "Rhodium", 102.9055),
    ("Pd", "Palladium", 106.42),
    ("Ag", "Silver", 107.8682),
    ("Cd", "Cadmium", 112.411),
    ("In", "Indium", 114.818),
    ("Sn", "Tin", 118.71),
    ("Sb", "Antimony", 121.76),
    ("Te", "Tellurium", 127.6),
    ("I", "Iodine", 126.90447),
    ("Xe", "Xenon", 131.293),
    ("Cs", "Caesium", 132.90545),
    ("Ba", "Barium", 137.327),
    ("La", "Lanthanum", 138.9055),
    ("Ce", "Cerium", 140.116),
    ("Pr", "Praseodymium", 140.90765),
    ("Nd", "Neodymium", 144.24),
    ("Pm", "Promethium", 145.0),
    ("Sm", "Samarium", 150.36),
    ("Eu", "Europium", 151.964),
    ("Gd", "Gadolinium", 157.25),
    ("Tb", "Terbium", 158.92534),
    ("Dy", "Dysprosium", 162.5),
    ("Ho", "Holmium", 164.93032),
    ("Er", "Erbium", 167.259),
    ("Tm", "Thulium", 168.93421),
    ("Yb", "Ytterbium", 173.04),
    ("Lu", "Lutetium", 174.967),
    ("Hf", "Hafnium", 178.49),
    ("Ta", "Tantalum", 180.9479),
    ("W", "Tungsten", 183.84),
    ("Re", "Rhenium", 186.207),
    ("Os", "Osmium", 190.23),
    ("Ir", "Iridium", 192.217),
    ("Pt", "Platinum", 195.078),
    ("Au", "Gold", 196.96655),
    ("Hg", "Mercury", 200.59),
    ("Tl", "Thallium", 204.3833),
    ("Pb", "Lead", 207.2),
    ("Bi", "Bismuth", 208.98038),
    ("Po", "Polonium", 209.0),
    ("At", "Astatine", 210.0),
    ("Rn", "Radon", 222.0),
    ("Fr", "Francium", 223.0),
    ("Ra", "Radium", 226.0),
    ("Ac", "Actinium", 227.0),
    ("Th", "Thorium", 232.0381),
    ("Pa", "Protactinium", 231.03588),
    ("U", "Uranium", 238.02891),
    ("Np", "Neptunium", 237.0),
    ("Pu", "Plutonium", 244.0),
    ("Am", "Americium", 243.0),
    ("Cm", "Curium", 247.0),
    ("Bk", "Berkelium", 247.0),
    ("Cf", "Californium", 251.0),
    ("Es", "Einsteinium", 252.0),
    ("Fm", "Fermium", 257.0),
    ("Md", "Mendelevium", 258.0),
    ("No", "Nobelium", 259.0),
    ("Lr", "Lawrencium", 262.0),
];

/// Atomic number of an element symbol (exact case).
pub(crate) fn atomic_number(symbol: &str) -> Option<usize> {
    ELEMENTS
        .iter()
        .position(|(sym, _, _)| *sym == symbol)
        .map(|i| i + 1)
}

/// Standard atomic mass of an element symbol.
pub(crate) fn atomic_mass(symbol: &str) -> Option<f64> {
    atomic_number(symbol).map(|z| ELEMENTS[z - 1].2)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_order() {
        assert_eq!(ELEMENTS.len(), 103);
        assert_eq!(atomic_number("H"), Some(1));
        assert_eq!(atomic_number("Fe"), Some(26));
        assert_eq!(atomic_number("I"), Some(53));
        assert_eq!(atomic_number("Pb"), Some(82));
        assert_eq!(atomic_number("U"), Some(92));
        assert_eq!(atomic_number("Lr"), Some(103));
        assert_eq!(atomic_number("fe"), None);
    }

    #[test]
    fn test_masses_increase_roughly_with_z() {
        assert!((atomic_mass("O").unwrap() - 15.9994).abs() < 1e-10);
        // only the classic inversions (Ar/K, Co/Ni, Te/I, Th/Pa, U/Np, Pu/Am) break monotonic order
        let inversions = ELEMENTS
            .windows(2)
            .filter(|w| w[1].2 < w[0].2)
            .count();
        assert!(inversions <= 8, "{inversions} inversions");
    }
}
