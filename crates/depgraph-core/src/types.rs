use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of the place units came from, typically a module-qualified
/// source file path. Stable across builds while the file is unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeSource(String);

impl NodeSource {
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    pub fn path(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeSource {
    fn from(path: &str) -> Self {
        Self::new(path)
    }
}

/// Logical identity of a unit: a fully-qualified name such as
/// `zoo.Animal` or `zoo.Cage$Lock` for nested units.
///
/// Not unique across sources: two sources may legally produce units with the
/// same id (shadowing).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ReferenceId(String);

impl ReferenceId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Package part of the name, empty for the default package.
    pub fn package_name(&self) -> &str {
        match self.0.rfind('.') {
            Some(pos) => &self.0[..pos],
            None => "",
        }
    }

    /// Unqualified name; for nested units the innermost segment.
    pub fn short_name(&self) -> &str {
        let simple = match self.0.rfind('.') {
            Some(pos) => &self.0[pos + 1..],
            None => self.0.as_str(),
        };
        match simple.rfind('$') {
            Some(pos) => &simple[pos + 1..],
            None => simple,
        }
    }
}

impl fmt::Display for ReferenceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ReferenceId {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

bitflags! {
    /// Modifier facts of units and members.
    ///
    /// Package-private access is the absence of `PUBLIC`, `PROTECTED` and
    /// `PRIVATE`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct AccessFlags: u32 {
        const PUBLIC = 1 << 0;
        const PROTECTED = 1 << 1;
        const PRIVATE = 1 << 2;
        const STATIC = 1 << 3;
        const FINAL = 1 << 4;
        const ABSTRACT = 1 << 5;
        const SYNTHETIC = 1 << 6;
        const BRIDGE = 1 << 7;
        const VOLATILE = 1 << 8;
        /// Produced by an annotation processor rather than written by hand.
        const GENERATED = 1 << 9;
        const LOCAL = 1 << 10;
        const ANONYMOUS = 1 << 11;
    }
}

impl Default for AccessFlags {
    fn default() -> Self {
        AccessFlags::empty()
    }
}

impl AccessFlags {
    const ACCESS_MASK: AccessFlags = AccessFlags::PUBLIC
        .union(AccessFlags::PROTECTED)
        .union(AccessFlags::PRIVATE);

    pub fn is_public(self) -> bool {
        self.contains(AccessFlags::PUBLIC)
    }

    pub fn is_protected(self) -> bool {
        self.contains(AccessFlags::PROTECTED)
    }

    pub fn is_private(self) -> bool {
        self.contains(AccessFlags::PRIVATE)
    }

    pub fn is_package_local(self) -> bool {
        !self.intersects(Self::ACCESS_MASK)
    }

    pub fn is_static(self) -> bool {
        self.contains(AccessFlags::STATIC)
    }

    pub fn is_final(self) -> bool {
        self.contains(AccessFlags::FINAL)
    }

    pub fn is_abstract(self) -> bool {
        self.contains(AccessFlags::ABSTRACT)
    }

    /// private < package-private < protected < public
    pub fn access_level(self) -> u8 {
        if self.is_public() {
            3
        } else if self.is_protected() {
            2
        } else if self.is_private() {
            0
        } else {
            1
        }
    }

    pub fn is_weaker_access(self, other: AccessFlags) -> bool {
        self.access_level() < other.access_level()
    }

    /// Flags present in `now` but not in `self`.
    pub fn added_in(self, now: AccessFlags) -> AccessFlags {
        now.difference(self)
    }

    /// Flags present in `self` but not in `now`.
    pub fn removed_in(self, now: AccessFlags) -> AccessFlags {
        self.difference(now)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitKind {
    Class,
    Interface,
    Enum,
    Annotation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetentionPolicy {
    Source,
    Class,
    Runtime,
}

/// Program elements an annotation may be applied to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElemType {
    Type,
    Field,
    Method,
    Parameter,
    Constructor,
    LocalVariable,
    AnnotationType,
    Package,
    TypeParameter,
    TypeUse,
    Module,
    RecordComponent,
}

/// Compile-time constant value of a field or an annotation member default.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ConstValue {
    Bool(bool),
    Int(i64),
    /// IEEE-754 bit pattern, so that values compare by identity.
    Float(u64),
    Char(char),
    Str(String),
}

impl ConstValue {
    pub fn float(value: f64) -> Self {
        ConstValue::Float(value.to_bits())
    }
}

impl fmt::Display for ConstValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConstValue::Bool(v) => write!(f, "{}", v),
            ConstValue::Int(v) => write!(f, "{}", v),
            ConstValue::Float(bits) => write!(f, "{}", f64::from_bits(*bits)),
            ConstValue::Char(c) => write!(f, "'{}'", c),
            ConstValue::Str(s) => write!(f, "\"{}\"", s),
        }
    }
}
