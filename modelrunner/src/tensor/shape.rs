use anyhow::{anyhow, Result};

pub fn numel(shape: &[usize]) -> usize {
    shape.iter().copied().product::<usize>()
}

/// `numel` for shapes that have not been validated yet.
pub(crate) fn checked_numel(shape: &[usize]) -> Result<usize> {
    shape
        .iter()
        .try_fold(1usize, |acc, dim| acc.checked_mul(*dim))
        .ok_or_else(|| anyhow!("shape {:?} has more elements than usize can hold", shape))
}

pub fn compute_strides(shape: &[usize]) -> Vec<usize> {
    let mut strides = vec![0; shape.len()];
    let mut stride = 1usize;
    for (idx, dim) in shape.iter().rev().enumerate() {
        let i = shape.len() - 1 - idx;
        strides[i] = stride;
        stride = stride.saturating_mul(*dim);
    }
    strides
}

pub(crate) fn is_contiguous(shape: &[usize], strides: &[usize]) -> bool {
    if shape.len() != strides.len() {
        return false;
    }
    strides == compute_strides(shape)
}

/// Number of elements a strided layout reaches into its storage.
pub(crate) fn storage_span(shape: &[usize], strides: &[usize]) -> Result<usize> {
    if shape.len() != strides.len() {
        return Err(anyhow!(
            "shape has {} dims but {} strides were given",
            shape.len(),
            strides.len()
        ));
    }
    if shape.iter().any(|dim| *dim == 0) {
        return Ok(0);
    }
    let mut last = 0usize;
    for (dim, stride) in shape.iter().zip(strides.iter()) {
        last = (dim - 1)
            .checked_mul(*stride)
            .and_then(|reach| last.checked_add(reach))
            .ok_or_else(|| anyhow!("strided layout overflows usize"))?;
    }
    last.checked_add(1)
        .ok_or_else(|| anyhow!("strided layout overflows usize"))
}

pub(crate) fn offset_for(shape: &[usize], strides: &[usize], indices: &[usize]) -> Result<usize> {
    if shape.len() != indices.len() {
        return Err(anyhow!(
            "expected {} indices, got {}",
            shape.len(),
            indices.len()
        ));
    }
    let mut offset = 0usize;
    for ((dim, stride), idx) in shape.iter().zip(strides.iter()).zip(indices.iter()) {
        if *idx >= *dim {
            return Err(anyhow!("index {} out of bounds for dim {}", idx, dim));
        }
        offset = offset.saturating_add(idx.saturating_mul(*stride));
    }
    Ok(offset)
}

pub(crate) fn linear_to_indices(linear: usize, shape: &[usize]) -> Vec<usize> {
    if shape.is_empty() {
        return Vec::new();
    }
    let mut rem = linear;
    let mut out = Vec::with_capacity(shape.len());
    let strides = compute_strides(shape);
    for (dim, stride) in shape.iter().zip(strides.iter()) {
        if *stride == 0 {
            out.push(0);
        } else {
            let coord = rem / *stride;
            out.push(coord.min(dim.saturating_sub(1)));
            rem %= *stride;
        }
    }
    out
}
