//! Shaped, typed, raw-byte-backed numeric arrays
//!
//! A [`Tensor`] is the only structured value the envelope codec knows how to
//! reconstruct. Its buffer is C-contiguous, row-major, in native byte order,
//! and its length always equals `product(shape) * dtype.width()`.

use crate::error::TensorError;
use bytes::Bytes;
use std::fmt;
use std::str::FromStr;

/// Canonical element types, named the way numpy names them on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DType {
    Bool,
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Float16,
    Float32,
    Float64,
    Complex64,
    Complex128,
}

impl DType {
    /// Every supported element type
    pub const ALL: [DType; 14] = [
        DType::Bool,
        DType::Int8,
        DType::Int16,
        DType::Int32,
        DType::Int64,
        DType::UInt8,
        DType::UInt16,
        DType::UInt32,
        DType::UInt64,
        DType::Float16,
        DType::Float32,
        DType::Float64,
        DType::Complex64,
        DType::Complex128,
    ];

    /// Canonical wire name
    pub const fn name(self) -> &'static str {
        match self {
            DType::Bool => "bool",
            DType::Int8 => "int8",
            DType::Int16 => "int16",
            DType::Int32 => "int32",
            DType::Int64 => "int64",
            DType::UInt8 => "uint8",
            DType::UInt16 => "uint16",
            DType::UInt32 => "uint32",
            DType::UInt64 => "uint64",
            DType::Float16 => "float16",
            DType::Float32 => "float32",
            DType::Float64 => "float64",
            DType::Complex64 => "complex64",
            DType::Complex128 => "complex128",
        }
    }

    /// Element width in bytes
    pub const fn width(self) -> usize {
        match self {
            DType::Bool | DType::Int8 | DType::UInt8 => 1,
            DType::Int16 | DType::UInt16 | DType::Float16 => 2,
            DType::Int32 | DType::UInt32 | DType::Float32 => 4,
            DType::Int64 | DType::UInt64 | DType::Float64 | DType::Complex64 => 8,
            DType::Complex128 => 16,
        }
    }

    /// Look up a dtype by its canonical name
    pub fn from_name(name: &str) -> Result<Self, TensorError> {
        DType::ALL
            .iter()
            .copied()
            .find(|dtype| dtype.name() == name)
            .ok_or_else(|| TensorError::UnknownDType {
                name: name.to_string(),
            })
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DType {
    type Err = TensorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DType::from_name(s)
    }
}

/// Rust element types with a plain-old-data layout matching a [`DType`]
pub trait Element: bytemuck::Pod {
    const DTYPE: DType;
}

macro_rules! impl_element {
    ($($ty:ty => $dtype:ident),* $(,)?) => {
        $(impl Element for $ty {
            const DTYPE: DType = DType::$dtype;
        })*
    };
}

impl_element! {
    i8 => Int8,
    i16 => Int16,
    i32 => Int32,
    i64 => Int64,
    u8 => UInt8,
    u16 => UInt16,
    u32 => UInt32,
    u64 => UInt64,
    f32 => Float32,
    f64 => Float64,
}

/// Multi-dimensional numeric array carried inside a state message
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    shape: Vec<usize>,
    dtype: DType,
    data: Bytes,
}

impl Tensor {
    /// Build a tensor from raw bytes, validating the buffer length
    pub fn new(
        shape: Vec<usize>,
        dtype: DType,
        data: impl Into<Bytes>,
    ) -> Result<Self, TensorError> {
        let data = data.into();
        let expected = element_count(&shape)?
            .checked_mul(dtype.width())
            .ok_or_else(|| TensorError::ShapeOverflow {
                shape: shape.clone(),
            })?;

        if data.len() != expected {
            return Err(TensorError::LengthMismatch {
                shape,
                dtype: dtype.name(),
                expected,
                actual: data.len(),
            });
        }

        Ok(Self { shape, dtype, data })
    }

    /// Build a tensor by copying typed elements in native byte order
    pub fn from_slice<T: Element>(shape: Vec<usize>, values: &[T]) -> Result<Self, TensorError> {
        let bytes = Bytes::copy_from_slice(bytemuck::cast_slice(values));
        Self::new(shape, T::DTYPE, bytes)
    }

    /// Copy the elements out as `T`, which must match the tensor dtype
    pub fn to_vec<T: Element>(&self) -> Result<Vec<T>, TensorError> {
        if T::DTYPE != self.dtype {
            return Err(TensorError::DTypeMismatch {
                requested: T::DTYPE.name(),
                actual: self.dtype.name(),
            });
        }
        // Copying avoids alignment requirements on the shared buffer
        Ok(bytemuck::pod_collect_to_vec::<u8, T>(&self.data[..]))
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn dtype(&self) -> DType {
        self.dtype
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Cheap clone of the underlying buffer
    pub fn data(&self) -> Bytes {
        self.data.clone()
    }

    /// Number of elements; a zero-dimensional tensor holds one
    pub fn numel(&self) -> usize {
        self.shape.iter().product()
    }
}

fn element_count(shape: &[usize]) -> Result<usize, TensorError> {
    shape
        .iter()
        .try_fold(1usize, |acc, &dim| acc.checked_mul(dim))
        .ok_or_else(|| TensorError::ShapeOverflow {
            shape: shape.to_vec(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dtype_names_round_trip() {
        for dtype in DType::ALL {
            assert_eq!(DType::from_name(dtype.name()), Ok(dtype));
        }
        assert!(matches!(
            DType::from_name("float128"),
            Err(TensorError::UnknownDType { .. })
        ));
        assert_eq!("complex64".parse::<DType>(), Ok(DType::Complex64));
    }

    #[test]
    fn test_tensor_length_invariant() {
        let ok = Tensor::new(vec![2, 3], DType::Int16, vec![0u8; 12]);
        assert!(ok.is_ok());

        let short = Tensor::new(vec![2, 3], DType::Int16, vec![0u8; 11]);
        assert_eq!(
            short,
            Err(TensorError::LengthMismatch {
                shape: vec![2, 3],
                dtype: "int16",
                expected: 12,
                actual: 11,
            })
        );
    }

    #[test]
    fn test_scalar_and_empty_shapes() {
        let scalar = Tensor::from_slice(vec![], &[7.5f64]).unwrap();
        assert_eq!(scalar.numel(), 1);
        assert_eq!(scalar.as_bytes().len(), 8);

        let empty = Tensor::new(vec![0, 4], DType::Float32, Vec::<u8>::new()).unwrap();
        assert_eq!(empty.numel(), 0);
    }

    #[test]
    fn test_shape_overflow_is_rejected() {
        let err = Tensor::new(vec![usize::MAX, 2], DType::UInt8, Vec::<u8>::new()).unwrap_err();
        assert!(matches!(err, TensorError::ShapeOverflow { .. }));
    }

    #[test]
    fn test_typed_views() {
        let values = [1.0f32, -2.5, 3.25, f32::MIN_POSITIVE];
        let tensor = Tensor::from_slice(vec![2, 2], &values).unwrap();
        assert_eq!(tensor.dtype(), DType::Float32);
        assert_eq!(tensor.to_vec::<f32>().unwrap(), values);
        assert!(matches!(
            tensor.to_vec::<i32>(),
            Err(TensorError::DTypeMismatch { .. })
        ));
    }
}
