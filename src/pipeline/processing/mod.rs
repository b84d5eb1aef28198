pub mod aggregate;
pub mod normalize;
pub mod outliers;
pub mod rules;
