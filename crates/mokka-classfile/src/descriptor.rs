//! Method and field descriptor parsing
//!
//! Descriptors arrive as constant-pool UTF-8 strings ("(IJ)V",
//! "Ljava/lang/String;", "[I"). The JIT needs the argument types (for the
//! symbolic-stack pops at call sites), the slot count, and the return type.

use crate::types::VmType;

/// Error while parsing a descriptor string
#[derive(Debug, thiserror::Error)]
#[error("malformed descriptor {0:?}")]
pub struct DescriptorError(pub String);

/// Parsed method descriptor
#[derive(Debug, Clone, PartialEq)]
pub struct MethodDescriptor {
    pub args: Vec<VmType>,
    pub return_type: VmType,
}

impl MethodDescriptor {
    /// Parse a method descriptor such as `(ILjava/lang/String;)V`.
    pub fn parse(desc: &str) -> Result<MethodDescriptor, DescriptorError> {
        let bytes = desc.as_bytes();
        if bytes.first() != Some(&b'(') {
            return Err(DescriptorError(desc.to_string()));
        }
        let mut pos = 1;
        let mut args = Vec::new();
        while pos < bytes.len() && bytes[pos] != b')' {
            let (ty, next) = parse_field_type(desc, pos)?;
            args.push(ty);
            pos = next;
        }
        if pos >= bytes.len() {
            return Err(DescriptorError(desc.to_string()));
        }
        let (return_type, end) = parse_field_type(desc, pos + 1)?;
        if end != bytes.len() {
            return Err(DescriptorError(desc.to_string()));
        }
        Ok(MethodDescriptor { args, return_type })
    }

    /// Number of argument slots: long and double count twice, and an
    /// instance method adds one for the receiver.
    pub fn arg_slots(&self, is_static: bool) -> u16 {
        let mut slots = if is_static { 0 } else { 1 };
        for arg in &self.args {
            slots += if arg.is_wide() { 2 } else { 1 };
        }
        slots
    }
}

/// Parse a single field type, returning the type and the offset just past it.
pub fn parse_field_type(desc: &str, pos: usize) -> Result<(VmType, usize), DescriptorError> {
    let bytes = desc.as_bytes();
    let c = *bytes.get(pos).ok_or_else(|| DescriptorError(desc.to_string()))?;
    match c {
        b'V' => Ok((VmType::Void, pos + 1)),
        b'B' => Ok((VmType::Byte, pos + 1)),
        b'C' => Ok((VmType::Char, pos + 1)),
        b'D' => Ok((VmType::Double, pos + 1)),
        b'F' => Ok((VmType::Float, pos + 1)),
        b'I' => Ok((VmType::Int, pos + 1)),
        b'J' => Ok((VmType::Long, pos + 1)),
        b'S' => Ok((VmType::Short, pos + 1)),
        b'Z' => Ok((VmType::Boolean, pos + 1)),
        b'L' => {
            let semi = desc[pos..]
                .find(';')
                .ok_or_else(|| DescriptorError(desc.to_string()))?;
            Ok((VmType::Reference, pos + semi + 1))
        }
        b'[' => {
            let (_, next) = parse_field_type(desc, pos + 1)?;
            Ok((VmType::Reference, next))
        }
        _ => Err(DescriptorError(desc.to_string())),
    }
}

/// Type of a single-character field descriptor, references for anything else.
pub fn field_type(desc: &str) -> VmType {
    match parse_field_type(desc, 0) {
        Ok((ty, _)) => ty,
        Err(_) => VmType::Reference,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_primitives() {
        let d = MethodDescriptor::parse("(II)I").unwrap();
        assert_eq!(d.args, vec![VmType::Int, VmType::Int]);
        assert_eq!(d.return_type, VmType::Int);
    }

    #[test]
    fn test_parse_void_no_args() {
        let d = MethodDescriptor::parse("()V").unwrap();
        assert!(d.args.is_empty());
        assert_eq!(d.return_type, VmType::Void);
    }

    #[test]
    fn test_parse_object_and_array() {
        let d = MethodDescriptor::parse("(Ljava/lang/String;[I)J").unwrap();
        assert_eq!(d.args, vec![VmType::Reference, VmType::Reference]);
        assert_eq!(d.return_type, VmType::Long);
    }

    #[test]
    fn test_parse_nested_array() {
        let d = MethodDescriptor::parse("([[Ljava/lang/Object;)V").unwrap();
        assert_eq!(d.args, vec![VmType::Reference]);
    }

    #[test]
    fn test_arg_slots_wide_and_receiver() {
        let d = MethodDescriptor::parse("(IJD)V").unwrap();
        assert_eq!(d.arg_slots(true), 5);
        assert_eq!(d.arg_slots(false), 6);
    }

    #[test]
    fn test_malformed_descriptors() {
        assert!(MethodDescriptor::parse("II)I").is_err());
        assert!(MethodDescriptor::parse("(I").is_err());
        assert!(MethodDescriptor::parse("(Q)V").is_err());
        assert!(MethodDescriptor::parse("(Ljava/lang/String)V").is_err());
    }

    #[test]
    fn test_field_type() {
        assert_eq!(field_type("I"), VmType::Int);
        assert_eq!(field_type("Ljava/lang/String;"), VmType::Reference);
        assert_eq!(field_type("[J"), VmType::Reference);
    }
}
