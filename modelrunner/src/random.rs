use std::marker::PhantomData;

use anyhow::{anyhow, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::tensor::{checked_numel, Tensor, TensorElement};

/// Seeded generator for weight and input tensors.
pub struct Random<T> {
    rng: StdRng,
    _marker: PhantomData<T>,
}

impl<T> Random<T>
where
    T: RandomValue,
{
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            _marker: PhantomData,
        }
    }

    pub fn generate(range: (T, T), shape: &[usize]) -> Result<Tensor> {
        Self::generate_with_seed(0, range, shape)
    }

    pub fn generate_with_seed(seed: u64, range: (T, T), shape: &[usize]) -> Result<Tensor> {
        let mut rng = StdRng::seed_from_u64(seed);
        generate_with_rng::<T>(&mut rng, range, shape)
    }

    pub fn next(&mut self, range: (T, T), shape: &[usize]) -> Result<Tensor> {
        generate_with_rng::<T>(&mut self.rng, range, shape)
    }
}

fn generate_with_rng<T: RandomValue>(
    rng: &mut StdRng,
    range: (T, T),
    shape: &[usize],
) -> Result<Tensor> {
    if !T::valid_range(range) {
        return Err(anyhow!("random tensor range is empty"));
    }
    let len = checked_numel(shape)?;
    let mut data = Vec::with_capacity(len);
    for _ in 0..len {
        data.push(T::sample(rng, range));
    }
    Tensor::from_vec_with_shape(data, shape)
}

pub trait RandomValue: TensorElement + PartialOrd {
    fn sample(rng: &mut StdRng, range: (Self, Self)) -> Self;

    fn valid_range(range: (Self, Self)) -> bool {
        range.0 <= range.1
    }
}

macro_rules! impl_random_value {
    ($($ty:ty),* $(,)?) => {
        $(
            impl RandomValue for $ty {
                fn sample(rng: &mut StdRng, range: (Self, Self)) -> Self {
                    rng.gen_range(range.0..=range.1)
                }
            }
        )*
    };
}

impl_random_value!(f32, f64, i8, i16, i32, i64, u8);
