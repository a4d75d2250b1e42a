use bitflags::bitflags;

bitflags! {
    /// Member access flags as they appear in class-data entries.
    #[derive(Debug, Copy, Clone, PartialEq, Eq)]
    pub struct AccessFlags: u32 {
        const PUBLIC = 0x0001;
        const PRIVATE = 0x0002;
        const PROTECTED = 0x0004;
        const STATIC = 0x0008;
        const FINAL = 0x0010;
        const NATIVE = 0x0100;
        const ABSTRACT = 0x0400;
        const CONSTRUCTOR = 0x0001_0000;
    }
}

/// One field or method entry of a class-data item. `index` is the member's
/// index into the dex file's field-id or method-id table.
#[derive(Debug, Copy, Clone)]
pub struct ClassMember {
    pub access_flags: AccessFlags,
    pub index: u32,
}

impl ClassMember {
    pub fn new(access_flags: AccessFlags, index: u32) -> Self {
        Self {
            access_flags,
            index,
        }
    }

    #[inline(always)]
    pub fn is_static(&self) -> bool {
        self.access_flags.contains(AccessFlags::STATIC)
    }
}

/// A class's class-data item, already decoded by the dex-file frontend.
///
/// Sections appear in the canonical class-data order: static fields,
/// instance fields, direct methods, virtual methods. A class def without a
/// class-data item (e.g. a marker interface) has no `ClassData` at all.
#[derive(Debug, Default, Clone)]
pub struct ClassData {
    pub static_fields: Vec<ClassMember>,
    pub instance_fields: Vec<ClassMember>,
    pub direct_methods: Vec<ClassMember>,
    pub virtual_methods: Vec<ClassMember>,
}

/// A method position yielded by [`ClassData::methods`].
#[derive(Copy, Clone)]
pub struct ClassMethod<'a> {
    pub member: &'a ClassMember,
    pub is_direct: bool,
}

impl ClassMethod<'_> {
    /// Only direct methods may carry `ACC_STATIC`.
    #[inline(always)]
    pub fn is_static(&self) -> bool {
        self.is_direct && self.member.is_static()
    }
}

impl ClassData {
    #[inline(always)]
    pub fn num_methods(&self) -> usize {
        self.direct_methods.len() + self.virtual_methods.len()
    }

    /// Iterates the methods in declaration order, direct methods first,
    /// then virtual methods. Field sections are not visited.
    pub fn methods(&self) -> impl Iterator<Item = ClassMethod<'_>> {
        let direct = self.direct_methods.iter().map(|member| ClassMethod {
            member,
            is_direct: true,
        });
        let virt = self.virtual_methods.iter().map(|member| ClassMethod {
            member,
            is_direct: false,
        });
        direct.chain(virt)
    }
}

/// The dex-file surface the writer consumes. Parsing lives upstream; the
/// writer only walks class defs and resolves method shorties.
pub trait DexSource {
    /// Location string recorded in the output, typically the file path.
    fn location(&self) -> &str;

    /// The checksum field of the dex file's own header.
    fn header_checksum(&self) -> u32;

    fn num_class_defs(&self) -> u32;

    /// Class-data of the class def at `class_def_index`, or `None` for an
    /// empty class.
    fn class_data(&self, class_def_index: u32) -> Option<&ClassData>;

    /// Shorty descriptor of the method-id at `method_idx`.
    fn method_shorty(&self, method_idx: u32) -> &str;

    /// Human-readable method name used in failure reports. Sources that
    /// can resolve real names should override this.
    fn pretty_method(&self, method_idx: u32) -> String {
        format!("<<method-{}>> in {}", method_idx, self.location())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn member(flags: AccessFlags, index: u32) -> ClassMember {
        ClassMember::new(flags, index)
    }

    #[test]
    fn test_methods_skip_fields_direct_first() {
        let class_data = ClassData {
            static_fields: vec![member(AccessFlags::STATIC, 0)],
            instance_fields: vec![member(AccessFlags::empty(), 1)],
            direct_methods: vec![member(AccessFlags::STATIC, 10)],
            virtual_methods: vec![member(AccessFlags::PUBLIC, 11), member(AccessFlags::PUBLIC, 12)],
        };

        let seen: Vec<(u32, bool)> = class_data
            .methods()
            .map(|m| (m.member.index, m.is_direct))
            .collect();
        assert_eq!(seen, vec![(10, true), (11, false), (12, false)]);
        assert_eq!(class_data.num_methods(), 3);
    }

    #[test]
    fn test_static_only_on_direct() {
        let m = member(AccessFlags::STATIC, 3);
        let as_direct = ClassMethod {
            member: &m,
            is_direct: true,
        };
        let as_virtual = ClassMethod {
            member: &m,
            is_direct: false,
        };
        assert!(as_direct.is_static());
        assert!(!as_virtual.is_static());
    }
}
