use anyhow::Result;
use modelrunner::{DType, Tensor};

#[test]
fn dtype_codes_round_trip() -> Result<()> {
    for dtype in DType::ALL {
        assert_eq!(DType::from_code(dtype.code())?, dtype);
    }
    assert_eq!(DType::F32.code(), 6);
    assert_eq!(DType::Bool.code(), 11);
    assert_eq!(DType::BF16.code(), 15);
    assert!(DType::from_code(9).is_err());
    Ok(())
}

#[test]
fn dtype_sizes() {
    assert_eq!(DType::I64.size_in_bytes(), 8);
    assert_eq!(DType::F16.size_in_bytes(), 2);
    assert_eq!(DType::Bool.size_in_bytes(), 1);
    assert_eq!(DType::BF16.size_in_bytes(), 2);
}

#[test]
fn to_vec_checks_element_type() -> Result<()> {
    let tensor = Tensor::from_vec(vec![1i16, -2, 3])?;
    assert_eq!(tensor.dtype(), DType::I16);
    assert!(tensor.to_vec::<i32>().is_err());
    assert_eq!(tensor.to_f64_vec()?, vec![1.0, -2.0, 3.0]);
    Ok(())
}

#[test]
fn half_precision_widens_to_f64() -> Result<()> {
    let half = Tensor::zeros(DType::F16, &[3])?;
    let bits: [u16; 3] = [0x3c00, 0xc000, 0x0001];
    unsafe { std::ptr::copy_nonoverlapping(bits.as_ptr(), half.data_ptr() as *mut u16, 3) };
    let values = half.to_f64_vec()?;
    assert_eq!(values[0], 1.0);
    assert_eq!(values[1], -2.0);
    assert!((values[2] - 5.960_464_477_539_063e-8).abs() < 1e-12);

    let bf = Tensor::zeros(DType::BF16, &[1])?;
    unsafe { *(bf.data_ptr() as *mut u16) = 0x3fc0 };
    assert_eq!(bf.to_f64_vec()?, vec![1.5]);

    let flags = Tensor::zeros(DType::Bool, &[2])?;
    unsafe { *flags.data_ptr().add(1) = 1 };
    assert_eq!(flags.to_f64_vec()?, vec![0.0, 1.0]);
    Ok(())
}

#[test]
fn dtype_serializes_lowercase() -> Result<()> {
    assert_eq!(serde_json::to_string(&DType::BF16)?, "\"bf16\"");
    assert_eq!(serde_json::from_str::<DType>("\"i64\"")?, DType::I64);
    Ok(())
}
