// Purpose: To store constants that are used across the library
pub const MASS_PROTON: f64 = 1.007276466621; // Unified atomic mass unit
pub const MASS_NEUTRON: f64 = 1.00866491595; // Unified atomic mass unit
pub const MASS_ELECTRON: f64 = 0.00054857990946; // Unified atomic mass unit
pub const MASS_WATER: f64 = 18.0105646863; // Unified atomic mass unit

// Mass difference between (13)C and (12)C, the spacing used for coarse
// isotope patterns
pub const MASS_C13_C12_SHIFT: f64 = 1.0033548378; // Unified atomic mass unit
