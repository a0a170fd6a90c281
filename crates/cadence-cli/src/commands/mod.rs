pub mod instances;
pub mod series;
pub mod window;
pub mod worker;
