//! Binding of callee storages into a caller's frame at a call site.

use retrace_core::{Architecture, CallSite, Expression, Frame, Identifier, IdentifierId, Storage};

/// Maps identifiers of a callee's signature to identifiers of the caller.
pub struct CallBinder<'a> {
    frame: &'a mut Frame,
    arch: &'a dyn Architecture,
    site: CallSite,
}

impl<'a> CallBinder<'a> {
    pub fn new(frame: &'a mut Frame, arch: &'a dyn Architecture, site: CallSite) -> Self {
        Self { frame, arch, site }
    }

    /// Returns the argument expression for a callee parameter.
    pub fn bind(&mut self, param: &Identifier) -> Expression {
        match &param.storage {
            Storage::OutArgument { original } => Expression::OutArgument(self.bind_identifier(original)),
            _ => Expression::Identifier(self.bind_identifier(param)),
        }
    }

    /// Returns the caller identifier that holds the value of a callee
    /// identifier across the call.
    pub fn bind_identifier(&mut self, callee: &Identifier) -> IdentifierId {
        let data_type = callee.data_type.clone();
        match &callee.storage {
            Storage::Register { index, .. } => match self.arch.register(*index) {
                Some(reg) => self.frame.ensure_register(reg),
                None => self.frame.ensure_storage(&callee.storage, data_type),
            },
            Storage::StackArgument { offset, .. } => {
                let external = offset - self.arch.return_address_size();
                let local = external - self.site.stack_depth;
                if local < 0 {
                    self.frame.ensure_stack_local(local, data_type)
                } else {
                    let ras = self.frame.return_address_size();
                    self.frame.ensure_stack_argument(local + ras, data_type)
                }
            }
            Storage::FpuStackArgument { depth } => self
                .frame
                .ensure_fpu_stack_variable(depth + self.site.fpu_depth, data_type),
            Storage::FlagGroup {
                flags_register,
                mask,
            } => {
                let name = self.arch.flag_group_name(*mask);
                self.frame.ensure_flag_group(*flags_register, *mask, name)
            }
            Storage::OutArgument { original } => self.bind_identifier(original),
            Storage::StackLocal { .. } => self.frame.ensure_storage(&callee.storage, data_type),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use retrace_core::register::{x86, X86_REGISTERS};
    use retrace_core::{DataType, X86};

    fn callee_frame() -> Frame {
        Frame::new(4)
    }

    #[test]
    fn test_bind_register() {
        let mut callee = callee_frame();
        let ecx = callee.ensure_register(&X86_REGISTERS[x86::ECX]);
        let param = callee.identifier(ecx).unwrap().clone();

        let mut caller = Frame::new(4);
        let mut binder = CallBinder::new(&mut caller, &X86, CallSite::default());
        let e = binder.bind(&param);
        let id = e.as_identifier().unwrap();
        assert_eq!(caller.identifier(id).unwrap().name, "ecx");
    }

    #[test]
    fn test_bind_stack_argument_to_local() {
        let mut callee = callee_frame();
        let arg = callee.ensure_stack_argument(4, DataType::word(32));
        let param = callee.identifier(arg).unwrap().clone();

        // Caller pushed 8 bytes; the argument is the last one pushed.
        let mut caller = Frame::new(4);
        let mut binder = CallBinder::new(&mut caller, &X86, CallSite::new(8, 0));
        let id = binder.bind(&param).as_identifier().unwrap();
        let ident = caller.identifier(id).unwrap();
        assert_eq!(
            ident.storage,
            Storage::StackLocal {
                offset: -8,
                bit_size: 32
            }
        );
    }

    #[test]
    fn test_bind_stack_argument_to_caller_argument() {
        let mut callee = callee_frame();
        let arg = callee.ensure_stack_argument(8, DataType::word(32));
        let param = callee.identifier(arg).unwrap().clone();

        // Tail position: nothing pushed, the callee's second argument is
        // the caller's second argument.
        let mut caller = Frame::new(4);
        let mut binder = CallBinder::new(&mut caller, &X86, CallSite::new(0, 0));
        let id = binder.bind(&param).as_identifier().unwrap();
        assert_eq!(caller.identifier(id).unwrap().name, "dwArg08");
    }

    #[test]
    fn test_bind_fpu_and_out() {
        let mut callee = callee_frame();
        let st = callee.ensure_fpu_stack_variable(0, DataType::real(64));
        let edx = callee.ensure_register(&X86_REGISTERS[x86::EDX]);
        let out = callee.ensure_out_argument(edx, 32).unwrap();
        let st_param = callee.identifier(st).unwrap().clone();
        let out_param = callee.identifier(out).unwrap().clone();

        let mut caller = Frame::new(4);
        let mut binder = CallBinder::new(&mut caller, &X86, CallSite::new(0, 2));
        let st_id = binder.bind(&st_param).as_identifier().unwrap();
        let out_expr = binder.bind(&out_param);
        assert_eq!(caller.identifier(st_id).unwrap().storage, Storage::FpuStackArgument { depth: 2 });
        let Expression::OutArgument(edx_id) = out_expr else {
            panic!("expected out argument, got {out_expr:?}");
        };
        assert_eq!(caller.identifier(edx_id).unwrap().name, "edx");
    }
}
