pub mod poscar;
pub mod vasp;
