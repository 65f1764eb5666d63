pub mod nurse;

pub use nurse::NurseService;
