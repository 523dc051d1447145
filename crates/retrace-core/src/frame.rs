//! Procedure frames: the identifiers a procedure refers to.

use std::fmt;

use indexmap::IndexMap;

use crate::error::{Error, Result};
use crate::register::RegisterDef;
use crate::storage::Storage;
use crate::types::DataType;

/// Index of an identifier within its [`Frame`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct IdentifierId(pub u32);

impl fmt::Display for IdentifierId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "id{}", self.0)
    }
}

/// A named, typed value slot bound to one storage.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Identifier {
    pub name: String,
    pub data_type: DataType,
    pub storage: Storage,
}

impl Identifier {
    /// Creates a new identifier.
    pub fn new(name: impl Into<String>, data_type: DataType, storage: Storage) -> Self {
        Self {
            name: name.into(),
            data_type,
            storage,
        }
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Per-procedure table of identifiers.
///
/// Each storage maps to at most one identifier. Identifiers are never
/// removed, so an [`IdentifierId`] stays valid for the frame's lifetime.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Frame {
    identifiers: Vec<Identifier>,
    by_storage: IndexMap<Storage, IdentifierId>,
    /// Bytes between the entry stack pointer and the first stack argument.
    return_address_size: i32,
}

impl Frame {
    /// Creates an empty frame.
    pub fn new(return_address_size: i32) -> Self {
        Self {
            identifiers: Vec::new(),
            by_storage: IndexMap::new(),
            return_address_size,
        }
    }

    /// Returns the size of the return address on the stack.
    pub fn return_address_size(&self) -> i32 {
        self.return_address_size
    }

    /// Number of identifiers.
    pub fn len(&self) -> usize {
        self.identifiers.len()
    }

    /// Returns true if the frame has no identifiers.
    pub fn is_empty(&self) -> bool {
        self.identifiers.is_empty()
    }

    /// Returns an identifier by id.
    pub fn identifier(&self, id: IdentifierId) -> Option<&Identifier> {
        self.identifiers.get(id.0 as usize)
    }

    /// Returns an identifier by id, or an error for a foreign id.
    pub fn get(&self, id: IdentifierId) -> Result<&Identifier> {
        self.identifier(id).ok_or(Error::InvalidIdentifier(id))
    }

    /// Iterates identifiers in creation order.
    pub fn identifiers(&self) -> impl Iterator<Item = (IdentifierId, &Identifier)> {
        self.identifiers
            .iter()
            .enumerate()
            .map(|(i, id)| (IdentifierId(i as u32), id))
    }

    /// Finds the identifier bound to a storage.
    pub fn find(&self, storage: &Storage) -> Option<IdentifierId> {
        self.by_storage.get(storage).copied()
    }

    /// Replaces an identifier's type.
    pub fn set_data_type(&mut self, id: IdentifierId, data_type: DataType) -> Result<()> {
        let ident = self
            .identifiers
            .get_mut(id.0 as usize)
            .ok_or(Error::InvalidIdentifier(id))?;
        ident.data_type = data_type;
        Ok(())
    }

    fn ensure(
        &mut self,
        storage: Storage,
        name: impl FnOnce() -> String,
        data_type: impl FnOnce() -> DataType,
    ) -> IdentifierId {
        if let Some(&id) = self.by_storage.get(&storage) {
            return id;
        }
        let id = IdentifierId(self.identifiers.len() as u32);
        self.identifiers
            .push(Identifier::new(name(), data_type(), storage.clone()));
        self.by_storage.insert(storage, id);
        id
    }

    /// Returns the identifier for a register, creating it if needed.
    pub fn ensure_register(&mut self, reg: &RegisterDef) -> IdentifierId {
        self.ensure(
            Storage::register(reg),
            || reg.name.to_string(),
            || DataType::word(reg.bit_size),
        )
    }

    /// Returns the identifier for an incoming stack argument.
    ///
    /// `offset` is relative to the entry stack pointer, so the first argument
    /// sits at the return-address size.
    pub fn ensure_stack_argument(&mut self, offset: i32, data_type: DataType) -> IdentifierId {
        let storage = Storage::StackArgument {
            offset,
            bit_size: data_type.bit_size(),
        };
        let name = format!("{}Arg{:02X}", data_type.name_prefix(), offset);
        self.ensure(storage, || name, || data_type)
    }

    /// Returns the identifier for a stack local at a negative offset.
    pub fn ensure_stack_local(&mut self, offset: i32, data_type: DataType) -> IdentifierId {
        let storage = Storage::StackLocal {
            offset,
            bit_size: data_type.bit_size(),
        };
        let name = format!("{}Loc{:02X}", data_type.name_prefix(), offset.unsigned_abs());
        self.ensure(storage, || name, || data_type)
    }

    /// Returns the identifier for a floating point stack slot.
    pub fn ensure_fpu_stack_variable(&mut self, depth: i32, data_type: DataType) -> IdentifierId {
        self.ensure(
            Storage::FpuStackArgument { depth },
            || format!("rArg{depth}"),
            || data_type,
        )
    }

    /// Returns the identifier for a group of condition flags.
    pub fn ensure_flag_group(
        &mut self,
        flags_register: usize,
        mask: u32,
        name: impl Into<String>,
    ) -> IdentifierId {
        self.ensure(
            Storage::FlagGroup {
                flags_register,
                mask,
            },
            || name.into(),
            DataType::bool,
        )
    }

    /// Returns the out-parameter identifier that passes back `original`.
    pub fn ensure_out_argument(
        &mut self,
        original: IdentifierId,
        pointer_bit_size: u32,
    ) -> Result<IdentifierId> {
        let orig = self.get(original)?.clone();
        let name = format!("{}Out", orig.name);
        let data_type = DataType::pointer_to(orig.data_type.clone(), pointer_bit_size);
        let storage = Storage::OutArgument {
            original: Box::new(orig),
        };
        Ok(self.ensure(storage, || name, || data_type))
    }

    /// Returns the identifier bound to `ident`'s storage, adding a copy of
    /// `ident` when absent.
    pub fn ensure_identifier(&mut self, ident: &Identifier) -> IdentifierId {
        self.ensure(
            ident.storage.clone(),
            || ident.name.clone(),
            || ident.data_type.clone(),
        )
    }

    /// Returns the identifier bound to `storage`, creating one with a
    /// storage-derived name when absent.
    pub fn ensure_storage(&mut self, storage: &Storage, data_type: DataType) -> IdentifierId {
        match storage {
            Storage::Register { index, .. } => {
                let name = format!("r{index}");
                self.ensure(storage.clone(), || name, || data_type)
            }
            Storage::StackArgument { offset, .. } => self.ensure_stack_argument(*offset, data_type),
            Storage::StackLocal { offset, .. } => self.ensure_stack_local(*offset, data_type),
            Storage::FpuStackArgument { depth } => self.ensure_fpu_stack_variable(*depth, data_type),
            Storage::FlagGroup {
                flags_register,
                mask,
            } => self.ensure_flag_group(*flags_register, *mask, format!("grf{mask:X}")),
            Storage::OutArgument { original } => {
                let name = format!("{}Out", original.name);
                self.ensure(storage.clone(), || name, || data_type)
            }
        }
    }

    /// Offset of an argument as seen by a caller.
    ///
    /// Stack arguments are measured from the caller's stack pointer at the
    /// call, so the first argument is at offset 0. FPU stack slots are
    /// reported by depth. Other storages have no external offset.
    pub fn external_offset(&self, id: IdentifierId) -> Option<i32> {
        match &self.identifier(id)?.storage {
            Storage::StackArgument { offset, .. } => Some(offset - self.return_address_size),
            Storage::FpuStackArgument { depth } => Some(*depth),
            Storage::Register { .. }
            | Storage::StackLocal { .. }
            | Storage::FlagGroup { .. }
            | Storage::OutArgument { .. } => None,
        }
    }
}
