/// Element symbols indexed by `atomic_number - 1`.
const SYMBOLS: [&str; 94] = [
    "H", "He", "Li", "Be", "B", "C", "N", "O", "F", "Ne",
    "Na", "Mg", "Al", "Si", "P", "S", "Cl", "Ar", "K", "Ca",
    "Sc", "Ti", "V", "Cr", "Mn", "Fe", "Co", "Ni", "Cu", "Zn",
    "Ga", "Ge", "As", "Se", "Br", "Kr", "Rb", "Sr", "Y", "Zr",
    "Nb", "Mo", "Tc", "Ru", "Rh", "Pd", "Ag", "Cd", "In", "Sn",
    "Sb", "Te", "I", "Xe", "Cs", "Ba", "La", "Ce", "Pr", "Nd",
    "Pm", "Sm", "Eu", "Gd", "Tb", "Dy", "Ho", "Er", "Tm", "Yb",
    "Lu", "Hf", "Ta", "W", "Re", "Os", "Ir", "Pt", "Au", "Hg",
    "Tl", "Pb", "Bi", "Po", "At", "Rn", "Fr", "Ra", "Ac", "Th",
    "Pa", "U", "Np", "Pu",
];

/// Returns the chemical symbol for an atomic number (1..=94).
pub fn symbol(atomic_number: u8) -> Option<&'static str> {
    let idx = (atomic_number as usize).checked_sub(1)?;
    SYMBOLS.get(idx).copied()
}

/// Looks up the atomic number for a symbol. Case-sensitive ("Li", not "LI").
///
/// POTCAR-style suffixes such as `Li_sv` or `O_s` are accepted; only the
/// part before the first underscore is compared.
pub fn atomic_number(symbol: &str) -> Option<u8> {
    let bare = symbol.split('_').next().unwrap_or(symbol).trim();
    SYMBOLS
        .iter()
        .position(|s| *s == bare)
        .map(|idx| (idx + 1) as u8)
}
