//! Element types for attribute buffers
//!
//! The set of numeric types a vertex or index buffer may hold is small and
//! fixed, so it is a closed enum. [`Scalar`] only maps Rust element types
//! onto it; all buffer code dispatches on [`ScalarKind`].

use half::f16;

/// Numeric type of one buffer component
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarKind {
    U8,
    I8,
    U16,
    I16,
    U32,
    I32,
    F16,
    F32,
    F64,
}

impl ScalarKind {
    /// OpenGL type tag (`GL_FLOAT`, `GL_UNSIGNED_INT`, ...)
    pub fn gl_type(self) -> u32 {
        match self {
            ScalarKind::U8 => glow::UNSIGNED_BYTE,
            ScalarKind::I8 => glow::BYTE,
            ScalarKind::U16 => glow::UNSIGNED_SHORT,
            ScalarKind::I16 => glow::SHORT,
            ScalarKind::U32 => glow::UNSIGNED_INT,
            ScalarKind::I32 => glow::INT,
            ScalarKind::F16 => glow::HALF_FLOAT,
            ScalarKind::F32 => glow::FLOAT,
            ScalarKind::F64 => glow::DOUBLE,
        }
    }

    /// Size of one component in bytes
    pub fn size(self) -> usize {
        match self {
            ScalarKind::U8 | ScalarKind::I8 => 1,
            ScalarKind::U16 | ScalarKind::I16 | ScalarKind::F16 => 2,
            ScalarKind::U32 | ScalarKind::I32 | ScalarKind::F32 => 4,
            ScalarKind::F64 => 8,
        }
    }

    /// Integer types are normalized when fed to float attributes
    pub fn is_integral(self) -> bool {
        !matches!(self, ScalarKind::F16 | ScalarKind::F32 | ScalarKind::F64)
    }

    /// Types accepted by `glDrawElements`
    pub fn is_index(self) -> bool {
        matches!(self, ScalarKind::U8 | ScalarKind::U16 | ScalarKind::U32)
    }
}

mod sealed {
    pub trait Sealed {}
}

/// Rust element types that can be uploaded to an attribute buffer
pub trait Scalar: bytemuck::Pod + sealed::Sealed {
    const KIND: ScalarKind;
}

macro_rules! impl_scalar {
    ($($ty:ty => $kind:ident),* $(,)?) => {
        $(
            impl sealed::Sealed for $ty {}
            impl Scalar for $ty {
                const KIND: ScalarKind = ScalarKind::$kind;
            }
        )*
    };
}

impl_scalar! {
    u8 => U8,
    i8 => I8,
    u16 => U16,
    i16 => I16,
    u32 => U32,
    i32 => I32,
    f16 => F16,
    f32 => F32,
    f64 => F64,
}

/// Shape and type of a raw attribute upload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttribLayout {
    /// Total number of components (rows x columns)
    pub len: usize,
    /// Components per element (rows)
    pub dim: usize,
    pub kind: ScalarKind,
}

impl AttribLayout {
    pub fn new(len: usize, dim: usize, kind: ScalarKind) -> Self {
        Self { len, dim, kind }
    }

    /// Total size in bytes
    pub fn byte_size(&self) -> usize {
        self.len * self.kind.size()
    }

    /// True when `len` splits into whole elements of `dim` components
    pub fn is_whole(&self) -> bool {
        match self.dim {
            0 => self.len == 0,
            dim => self.len % dim == 0,
        }
    }
}

/// Column-major attribute data: `dim` rows, one column per element
#[derive(Debug, Clone, PartialEq)]
pub struct VertexData<T> {
    pub dim: usize,
    pub data: Vec<T>,
}

impl<T: Scalar> VertexData<T> {
    pub fn new(dim: usize, data: Vec<T>) -> Self {
        Self { dim, data }
    }

    /// Number of elements (columns)
    pub fn cols(&self) -> usize {
        if self.dim == 0 {
            0
        } else {
            self.data.len() / self.dim
        }
    }

    /// Components of element `index`
    ///
    /// Panics if `index >= self.cols()`.
    pub fn column(&self, index: usize) -> &[T] {
        &self.data[index * self.dim..(index + 1) * self.dim]
    }
}
