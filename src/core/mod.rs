pub mod blur;
pub mod border;
pub mod cell;
pub mod container;
pub mod phash;
pub mod season;
pub mod suspicion;
