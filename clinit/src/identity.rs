use std::fmt::{self, Display};

use crate::error::LinkageError;

/// Identity of a defining class loader.
///
/// Loaders are compared by this token only, two loaders never share one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LoaderId(pub u64);

impl LoaderId {
    pub const BOOTSTRAP: LoaderId = LoaderId(0);
}

impl Display for LoaderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Self::BOOTSTRAP {
            write!(f, "bootstrap")
        } else {
            write!(f, "loader#{}", self.0)
        }
    }
}

/// A loaded type: its defining loader and fully qualified binary name.
///
/// Array types use descriptor names, `[I` or `[Lpkg.Name;`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClassIdentity {
    loader: LoaderId,
    name: String,
}

/// What a class identity names once array dimensions are taken into account.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TypeShape {
    Class,
    /// Array whose innermost element type is a primitive, e.g. `[[J`.
    PrimitiveArray(char),
    /// Array whose innermost element type is a class or interface.
    ReferenceArray(ClassIdentity),
}

const PRIMITIVE_DESCRIPTORS: &[char] = &['Z', 'B', 'C', 'S', 'I', 'J', 'F', 'D'];

impl ClassIdentity {
    pub fn new(loader: LoaderId, name: impl Into<String>) -> Self {
        Self {
            loader,
            name: name.into(),
        }
    }

    pub fn bootstrap(name: impl Into<String>) -> Self {
        Self::new(LoaderId::BOOTSTRAP, name)
    }

    pub fn loader(&self) -> LoaderId {
        self.loader
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_array(&self) -> bool {
        self.name.starts_with('[')
    }

    /// Array type with this class as its element type, defined by the same loader.
    pub fn array_of(&self) -> ClassIdentity {
        let name = if self.is_array() {
            format!("[{}", self.name)
        } else {
            format!("[L{};", self.name)
        };
        ClassIdentity::new(self.loader, name)
    }

    pub fn shape(&self) -> Result<TypeShape, LinkageError> {
        let element = self.name.trim_start_matches('[');
        if element.len() == self.name.len() {
            return Ok(TypeShape::Class);
        }
        let malformed = || LinkageError::MalformedDescriptor(self.name.clone());
        let mut chars = element.chars();
        match chars.next() {
            Some('L') => {
                let class_name = chars.as_str().strip_suffix(';').ok_or_else(malformed)?;
                if class_name.is_empty() || class_name.contains(['[', ';']) {
                    return Err(malformed());
                }
                Ok(TypeShape::ReferenceArray(ClassIdentity::new(
                    self.loader,
                    class_name,
                )))
            }
            Some(c) if PRIMITIVE_DESCRIPTORS.contains(&c) && chars.as_str().is_empty() => {
                Ok(TypeShape::PrimitiveArray(c))
            }
            _ => Err(malformed()),
        }
    }
}

impl Display for ClassIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.loader, self.name)
    }
}
