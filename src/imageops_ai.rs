pub mod linear;
pub mod mask;
pub mod padding;

use num_traits::{AsPrimitive, Bounded};
use std::any::TypeId;

pub fn is_floating_point<T: 'static>() -> bool {
    TypeId::of::<T>() == TypeId::of::<f32>() || TypeId::of::<T>() == TypeId::of::<f64>()
}

/// Largest channel value of `T` as `f32`: `1.0` for floats, `MAX` for integers.
pub fn get_max_value<T: Bounded + AsPrimitive<f32> + 'static>() -> f32 {
    if is_floating_point::<T>() {
        1.0
    } else {
        T::max_value().as_()
    }
}
