//! Geometry primitives.

use std::collections::HashMap;
use std::fmt::{self, Display};

/// Default precision.
pub const PRECISION: usize = 6;

/// A shape with an area.
pub trait Shape {
    fn area(&self) -> f64;

    fn name(&self) -> String {
        String::from("shape")
    }
}

/// A circle.
#[derive(Debug, Clone)]
pub struct Circle {
    pub radius: f64,
    label: String,
}

impl Circle {
    pub fn new(radius: f64) -> Self {
        Self { radius, label: String::new() }
    }

    pub(crate) async fn load() -> Option<Self> {
        None
    }

    fn secret(&self) -> &str {
        &self.label
    }
}

impl Shape for Circle {
    fn area(&self) -> f64 {
        std::f64::consts::PI * self.radius * self.radius
    }
}

impl Display for Circle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "circle({})", self.radius)
    }
}

pub enum Kind {
    Round,
    Square,
}

mod internal {
    pub fn helper() {}
}
