//! Incremental construction of procedure signatures.

use indexmap::IndexMap;
use log::trace;

use retrace_core::{Architecture, Frame, IdentifierId, Signature};

use crate::error::Result;

/// Collects the return value and parameters of a signature in order.
///
/// Arguments are appended in the order they are added: return value,
/// register arguments, stack arguments, FPU stack arguments and finally
/// out-arguments. Stack and FPU arguments at the same external offset are
/// collapsed to the widest identifier.
pub struct SignatureBuilder<'a> {
    frame: &'a mut Frame,
    arch: &'a dyn Architecture,
    return_value: Option<IdentifierId>,
    parameters: Vec<IdentifierId>,
    register_arguments: Vec<usize>,
    stack_slots: IndexMap<i32, usize>,
    fpu_slots: IndexMap<i32, usize>,
    fpu_stack_delta: i32,
    fpu_stack_out_argument_max: i32,
}

impl<'a> SignatureBuilder<'a> {
    pub fn new(frame: &'a mut Frame, arch: &'a dyn Architecture) -> Self {
        Self {
            frame,
            arch,
            return_value: None,
            parameters: Vec::new(),
            register_arguments: Vec::new(),
            stack_slots: IndexMap::new(),
            fpu_slots: IndexMap::new(),
            fpu_stack_delta: 0,
            fpu_stack_out_argument_max: retrace_core::signature::DEFAULT_FPU_STACK_OUT_ARGUMENT_MAX,
        }
    }

    /// Carries FPU stack metadata into the built signature.
    pub fn with_fpu_stack(mut self, delta: i32, out_argument_max: i32) -> Self {
        self.fpu_stack_delta = delta;
        self.fpu_stack_out_argument_max = out_argument_max;
        self
    }

    /// The frame the signature's identifiers live in.
    pub fn frame(&mut self) -> &mut Frame {
        self.frame
    }

    /// Makes a flag group the return value. Architectures without a flags
    /// register cannot return flags; the request is ignored for them.
    pub fn add_flag_group_return_value(&mut self, mask: u32) {
        let Some(flags) = self.arch.flags_register() else {
            trace!("no flags register; flag group {mask:#x} not returned");
            return;
        };
        let name = self.arch.flag_group_name(mask);
        let id = self.frame.ensure_flag_group(flags.index, mask, name);
        self.return_value = Some(id);
    }

    /// Adds a register argument. Returns false if the index is unknown to
    /// the architecture or the register lies inside an argument register
    /// already added.
    pub fn add_register_argument(&mut self, index: usize) -> bool {
        let Some(reg) = self.arch.register(index) else {
            trace!("register index {index} has no definition; skipped");
            return false;
        };
        let covered = self.register_arguments.iter().any(|&other| {
            self.arch
                .register(other)
                .is_some_and(|o| self.arch.is_sub_register_of(reg, o))
        });
        if covered || self.register_arguments.contains(&index) {
            return false;
        }
        let id = self.frame.ensure_register(reg);
        self.register_arguments.push(index);
        self.parameters.push(id);
        true
    }

    /// Adds a stack argument at `offset` as seen by the caller. A wider
    /// identifier already at that offset wins; a narrower one is replaced.
    pub fn add_stack_argument(&mut self, offset: i32, id: IdentifierId) {
        let frame = &*self.frame;
        Self::add_slot(frame, &mut self.parameters, &mut self.stack_slots, offset, id);
    }

    /// Adds an FPU stack argument at `depth`.
    pub fn add_fpu_stack_argument(&mut self, depth: i32, id: IdentifierId) {
        let frame = &*self.frame;
        Self::add_slot(frame, &mut self.parameters, &mut self.fpu_slots, depth, id);
    }

    fn add_slot(
        frame: &Frame,
        parameters: &mut Vec<IdentifierId>,
        slots: &mut IndexMap<i32, usize>,
        offset: i32,
        id: IdentifierId,
    ) {
        let width = |id: IdentifierId| frame.identifier(id).map_or(0, |i| i.data_type.bit_size());
        match slots.get(&offset) {
            Some(&pos) => {
                if width(parameters[pos]) < width(id) {
                    parameters[pos] = id;
                }
            }
            None => {
                slots.insert(offset, parameters.len());
                parameters.push(id);
            }
        }
    }

    /// Adds an argument. An out-argument becomes the return value when there
    /// is none yet; otherwise it is passed back through a pointer parameter.
    pub fn add_argument(&mut self, id: IdentifierId, is_out: bool) -> Result<()> {
        if !is_out {
            self.parameters.push(id);
            return Ok(());
        }
        if self.return_value.is_none() {
            self.return_value = Some(id);
            return Ok(());
        }
        let out = self.frame.ensure_out_argument(id, self.arch.pointer_bit_size())?;
        if !self.parameters.contains(&out) {
            self.parameters.push(out);
        }
        Ok(())
    }

    /// Returns true once a return value has been chosen.
    pub fn has_return_value(&self) -> bool {
        self.return_value.is_some()
    }

    /// Freezes the accumulated arguments into a valid signature.
    pub fn build(self) -> Result<Signature> {
        let return_value = match self.return_value {
            Some(id) => Some(self.frame.get(id)?.clone()),
            None => None,
        };
        let parameters = self
            .parameters
            .iter()
            .map(|&id| self.frame.get(id).cloned())
            .collect::<retrace_core::Result<Vec<_>>>()?;
        let mut sig = Signature::new(return_value, parameters);
        sig.fpu_stack_delta = self.fpu_stack_delta;
        sig.fpu_stack_out_argument_max = self.fpu_stack_out_argument_max;
        Ok(sig)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use retrace_core::register::x86;
    use retrace_core::{DataType, Storage, X86};

    #[test]
    fn test_register_arguments_in_order() {
        let mut frame = Frame::new(4);
        let mut sb = SignatureBuilder::new(&mut frame, &X86);
        assert!(sb.add_register_argument(x86::ECX));
        assert!(sb.add_register_argument(x86::EDX));
        let sig = sb.build().unwrap();
        let names: Vec<_> = sig.parameters.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["ecx", "edx"]);
        assert!(sig.return_value.is_none());
        assert!(sig.is_valid());
    }

    #[test]
    fn test_sub_register_suppressed() {
        let mut frame = Frame::new(4);
        let mut sb = SignatureBuilder::new(&mut frame, &X86);
        assert!(sb.add_register_argument(x86::EAX));
        assert!(!sb.add_register_argument(x86::AL));
        assert!(!sb.add_register_argument(x86::AX));
        assert!(!sb.add_register_argument(x86::EAX));
        assert_eq!(sb.build().unwrap().parameters.len(), 1);
    }

    #[test]
    fn test_unknown_register_skipped() {
        let mut frame = Frame::new(4);
        let mut sb = SignatureBuilder::new(&mut frame, &X86);
        assert!(!sb.add_register_argument(500));
        assert!(sb.build().unwrap().parameters.is_empty());
    }

    #[test]
    fn test_stack_argument_widest_wins() {
        let mut frame = Frame::new(4);
        let narrow = frame.ensure_stack_argument(4, DataType::word(16));
        let wide = frame.ensure_stack_argument(4, DataType::word(32));
        let next = frame.ensure_stack_argument(8, DataType::word(32));
        let mut sb = SignatureBuilder::new(&mut frame, &X86);
        sb.add_stack_argument(0, narrow);
        sb.add_stack_argument(0, wide);
        sb.add_stack_argument(0, narrow);
        sb.add_stack_argument(4, next);
        let sig = sb.build().unwrap();
        let names: Vec<_> = sig.parameters.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["dwArg04", "dwArg08"]);
    }

    #[test]
    fn test_first_out_argument_becomes_return_value() {
        let mut frame = Frame::new(4);
        let eax = frame.ensure_register(&retrace_core::register::X86_REGISTERS[x86::EAX]);
        let edx = frame.ensure_register(&retrace_core::register::X86_REGISTERS[x86::EDX]);
        let mut sb = SignatureBuilder::new(&mut frame, &X86);
        sb.add_argument(eax, true).unwrap();
        sb.add_argument(edx, true).unwrap();
        let sig = sb.build().unwrap();
        assert_eq!(sig.return_value.as_ref().map(|r| r.name.as_str()), Some("eax"));
        assert_eq!(sig.parameters.len(), 1);
        assert_eq!(sig.parameters[0].name, "edxOut");
        assert!(sig.parameters[0].storage.is_register_out_argument());
    }

    #[test]
    fn test_flag_group_return_value() {
        let mut frame = Frame::new(4);
        let mut sb = SignatureBuilder::new(&mut frame, &X86);
        sb.add_flag_group_return_value(x86::FLAG_S | x86::FLAG_Z);
        assert!(sb.has_return_value());
        let sig = sb.build().unwrap();
        let rv = sig.return_value.unwrap();
        assert_eq!(rv.name, "SZ");
        assert!(matches!(rv.storage, Storage::FlagGroup { mask, .. } if mask == x86::FLAG_S | x86::FLAG_Z));
        assert_eq!(rv.data_type, DataType::bool());
    }

    #[test]
    fn test_fpu_metadata_carried() {
        let mut frame = Frame::new(4);
        let sig = SignatureBuilder::new(&mut frame, &X86)
            .with_fpu_stack(1, 0)
            .build()
            .unwrap();
        assert_eq!(sig.fpu_stack_delta, 1);
        assert_eq!(sig.fpu_stack_out_argument_max, 0);
    }
}
