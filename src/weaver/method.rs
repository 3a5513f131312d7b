//! Method body rewriting.
//!
//! [`MethodBodyRewriter`] turns an original `Code` attribute into a monitored one:
//!
//! ```text
//! entry:    aload_0 | aconst_null; ldc "<label>"; <Object[] of arguments>
//!           invokestatic Context.start; astore <ctx>
//!           ...original instructions...
//! each      <xstore tmp>; aload <ctx>; <xload tmp>; [box] | aconst_null
//! return:   invokevirtual Context.stop; <xload tmp>; <xreturn>
//!           ...
//! handler:  astore tmp; aload <ctx>; aload tmp
//!           invokevirtual Context.stopWithException; aload tmp; athrow
//! ```
//!
//! The original instructions are re-emitted through [`CodeEncoder`]: non-branching instructions
//! are copied byte for byte, branches and switches are re-targeted through labels so that every
//! offset shifted by the prologue or the exit sequences stays correct. A branch to a return
//! lands on the start of its exit sequence.
//!
//! The context handle lives in the first slot past the original locals and a scratch slot
//! follows it, so no original local is ever clobbered.

use std::collections::HashMap;

use crate::{
    assembly::{decode_stream, opcodes, CodeEncoder, Instruction, Label, Operand},
    classfile::{
        attribute::{
            LINE_NUMBER_TABLE, LOCAL_VARIABLE_TABLE, LOCAL_VARIABLE_TYPE_TABLE,
            RUNTIME_INVISIBLE_TYPE_ANNOTATIONS, RUNTIME_VISIBLE_TYPE_ANNOTATIONS, STACK_MAP_TABLE,
        },
        stackmap::initial_locals,
        Attribute, CodeAttribute, ConstantPool, ExceptionTableEntry, LineNumberEntry,
        LocalVariableEntry, MethodDescriptor, ReturnType, ValueKind, VerificationType,
    },
    weaver::{
        arguments::{emit_box, entry_stack_peak, materialize, ParamKind},
        config::WeaveConfig,
        frames::{rewrite_stack_map, FrameLayout},
        label::MonitoringLabel,
        region::{ProtectedRegion, THROWABLE_CLASS},
    },
    Error, Result,
};

/// The method being rewritten.
#[derive(Debug, Clone, Copy)]
pub struct MethodTarget<'m> {
    /// Monitoring label passed to the entry hook
    pub label: &'m MonitoringLabel,
    /// Parsed descriptor
    pub descriptor: &'m MethodDescriptor,
    /// Whether the method has no receiver
    pub is_static: bool,
}

/// Constant pool references shared by the injected sequences.
#[derive(Debug, Clone, Copy)]
struct Hooks {
    context_class: u16,
    start: u16,
    stop: u16,
    stop_with_exception: u16,
    throwable: u16,
}

/// Local slots used by the injected sequences.
#[derive(Debug, Clone, Copy)]
struct Slots {
    context: u16,
    scratch: u16,
}

/// Original offset to new offset, including the end-of-code position.
#[derive(Debug)]
struct OffsetMap {
    offsets: Vec<Option<usize>>,
}

impl OffsetMap {
    fn get(&self, offset: u16) -> Result<u16> {
        let mapped = self
            .offsets
            .get(usize::from(offset))
            .copied()
            .flatten()
            .ok_or_else(|| malformed_error!("Offset {} is not an instruction boundary", offset))?;
        u16::try_from(mapped).map_err(|_| malformed_error!("Offset {} exceeds 65535", mapped))
    }
}

/// Rewrites method bodies of one class.
///
/// The rewriter borrows the class's constant pool and adds the hook references, the label
/// strings and the boxing methods to it as it goes.
pub struct MethodBodyRewriter<'a> {
    pool: &'a mut ConstantPool,
    config: &'a WeaveConfig,
    this_class: u16,
    stack_maps: bool,
}

impl<'a> MethodBodyRewriter<'a> {
    /// Create a rewriter for a class whose `this_class` index is `this_class`.
    ///
    /// `stack_maps` requests a `StackMapTable` on every rewritten body, even one that had none
    /// (required for class files of version 50 and later).
    pub fn new(
        pool: &'a mut ConstantPool,
        config: &'a WeaveConfig,
        this_class: u16,
        stack_maps: bool,
    ) -> Self {
        MethodBodyRewriter {
            pool,
            config,
            this_class,
            stack_maps,
        }
    }

    /// Produce the monitored version of `code`.
    ///
    /// # Errors
    /// Returns [`Error::Rewrite`] naming the method if the body cannot be rewritten
    /// consistently: undecodable code, a return instruction that contradicts the descriptor, a
    /// branch that no longer reaches its target, or a body that outgrows the format's limits.
    pub fn rewrite(
        &mut self,
        target: &MethodTarget<'_>,
        code: &CodeAttribute,
    ) -> Result<CodeAttribute> {
        self.rewrite_body(target, code).map_err(|error| match error {
            Error::Rewrite { .. } => error,
            other => rewrite_error!(target.label, "{}", other),
        })
    }

    fn rewrite_body(
        &mut self,
        target: &MethodTarget<'_>,
        code: &CodeAttribute,
    ) -> Result<CodeAttribute> {
        let instructions = decode_stream(&code.code)?;
        let return_kind = target.descriptor.return_type.kind();
        if let Some(mismatch) = instructions
            .iter()
            .find(|i| i.is_return() && i.return_kind() != return_kind)
        {
            return Err(rewrite_error!(
                target.label,
                "{} at {} contradicts the declared return type",
                mismatch.mnemonic,
                mismatch.offset
            ));
        }

        let receiver = u16::from(!target.is_static);
        if target.descriptor.parameter_slots() + receiver > code.max_locals {
            return Err(rewrite_error!(
                target.label,
                "max_locals {} is smaller than the parameter slots",
                code.max_locals
            ));
        }

        let slots = Slots {
            context: code.max_locals,
            scratch: code
                .max_locals
                .checked_add(1)
                .ok_or_else(|| rewrite_error!(target.label, "No local slot left for the context"))?,
        };
        let scratch_width = return_kind.map_or(1, ValueKind::width);
        let max_locals = slots
            .scratch
            .checked_add(scratch_width)
            .ok_or_else(|| rewrite_error!(target.label, "No local slot left for the result"))?;
        let max_stack = code
            .max_stack
            .checked_add(2)
            .ok_or_else(|| rewrite_error!(target.label, "Operand stack limit exceeded"))?
            .max(entry_stack_peak(target.descriptor));

        let hooks = self.hooks()?;
        let mut encoder = CodeEncoder::new();
        self.emit_entry(&mut encoder, target, hooks, slots)?;
        let region_start = encoder.position();

        let labels: HashMap<u32, Label> = instructions
            .iter()
            .map(|i| (i.offset, encoder.new_label()))
            .collect();
        let end = encoder.new_label();

        for instruction in &instructions {
            encoder.bind(labels[&instruction.offset])?;
            self.emit_instruction(
                &mut encoder,
                instruction,
                code,
                &labels,
                target,
                hooks,
                slots,
            )?;
        }
        encoder.bind(end)?;
        let handler = encoder.position();
        Self::emit_handler(&mut encoder, hooks, slots);

        let mut offsets = vec![None; code.code.len() + 1];
        for (offset, label) in &labels {
            offsets[*offset as usize] = encoder.label_offset(*label);
        }
        offsets[code.code.len()] = encoder.label_offset(end);
        let map = OffsetMap { offsets };
        let new_code = encoder.finish()?;

        let mut exception_table = code
            .exception_table
            .iter()
            .map(|entry| {
                Ok(ExceptionTableEntry {
                    start_pc: map.get(entry.start_pc)?,
                    end_pc: map.get(entry.end_pc)?,
                    handler_pc: map.get(entry.handler_pc)?,
                    catch_type: entry.catch_type,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        let region = ProtectedRegion::new(region_start, handler, handler, hooks.throwable)?;
        region.attach(&mut exception_table);

        let attributes = self.rewrite_attributes(target, code, &map, hooks, region)?;

        log::trace!(
            "{}: code {} -> {} bytes, max_stack {}, max_locals {}",
            target.label,
            code.code.len(),
            new_code.len(),
            max_stack,
            max_locals
        );

        Ok(CodeAttribute {
            max_stack,
            max_locals,
            code: new_code,
            exception_table,
            attributes,
        })
    }

    fn hooks(&mut self) -> Result<Hooks> {
        let config = self.config;
        let context = config.context_class.as_str();
        Ok(Hooks {
            context_class: self.pool.add_class(context)?,
            start: self.pool.add_method_ref(
                context,
                &config.start_method,
                &config.start_descriptor(),
            )?,
            stop: self
                .pool
                .add_method_ref(context, &config.stop_method, config.stop_descriptor())?,
            stop_with_exception: self.pool.add_method_ref(
                context,
                &config.stop_with_exception_method,
                config.stop_with_exception_descriptor(),
            )?,
            throwable: self.pool.add_class(THROWABLE_CLASS)?,
        })
    }

    fn emit_entry(
        &mut self,
        encoder: &mut CodeEncoder,
        target: &MethodTarget<'_>,
        hooks: Hooks,
        slots: Slots,
    ) -> Result<()> {
        encoder.emit(if target.is_static {
            opcodes::ACONST_NULL
        } else {
            opcodes::ALOAD_0
        });
        let label = self.pool.add_string(target.label.as_str())?;
        encoder.ldc(label);
        materialize(encoder, self.pool, target.descriptor, target.is_static)?;
        encoder.emit_indexed(opcodes::INVOKESTATIC, hooks.start);
        encoder.store(ValueKind::Reference, slots.context);
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn emit_instruction(
        &mut self,
        encoder: &mut CodeEncoder,
        instruction: &Instruction,
        code: &CodeAttribute,
        labels: &HashMap<u32, Label>,
        target: &MethodTarget<'_>,
        hooks: Hooks,
        slots: Slots,
    ) -> Result<()> {
        let label_at = |offset: u32| {
            labels.get(&offset).copied().ok_or_else(|| {
                rewrite_error!(
                    target.label,
                    "Branch target {} is not an instruction",
                    offset
                )
            })
        };

        if instruction.is_return() {
            self.emit_normal_exit(encoder, &target.descriptor.return_type, hooks, slots)?;
            encoder.emit(instruction.opcode);
            return Ok(());
        }

        match &instruction.operand {
            Operand::Target(offset) if instruction.is_branch() => {
                encoder.emit_branch(instruction.opcode, label_at(*offset)?)?;
            }
            Operand::TableSwitch {
                default,
                low,
                targets,
                ..
            } => {
                let targets = targets
                    .iter()
                    .map(|offset| label_at(*offset))
                    .collect::<Result<Vec<_>>>()?;
                encoder.emit_tableswitch(label_at(*default)?, *low, &targets)?;
            }
            Operand::LookupSwitch { default, pairs } => {
                let pairs = pairs
                    .iter()
                    .map(|(key, offset)| Ok((*key, label_at(*offset)?)))
                    .collect::<Result<Vec<_>>>()?;
                encoder.emit_lookupswitch(label_at(*default)?, &pairs)?;
            }
            _ => {
                let bytes = code
                    .code
                    .get(instruction.offset as usize..instruction.next_offset() as usize)
                    .ok_or(out_of_bounds_error!())?;
                encoder.emit_raw(bytes);
            }
        }
        Ok(())
    }

    /// Everything before a return instruction: hand the result (or null) to `stop`, then put
    /// the original value back on the stack.
    fn emit_normal_exit(
        &mut self,
        encoder: &mut CodeEncoder,
        return_type: &ReturnType,
        hooks: Hooks,
        slots: Slots,
    ) -> Result<()> {
        match return_type {
            ReturnType::Void => {
                encoder.load(ValueKind::Reference, slots.context);
                encoder.emit(opcodes::ACONST_NULL);
                encoder.emit_indexed(opcodes::INVOKEVIRTUAL, hooks.stop);
            }
            ReturnType::Value(field) => {
                let kind = field.kind();
                encoder.store(kind, slots.scratch);
                encoder.load(ValueKind::Reference, slots.context);
                encoder.load(kind, slots.scratch);
                emit_box(encoder, self.pool, ParamKind::of(field))?;
                encoder.emit_indexed(opcodes::INVOKEVIRTUAL, hooks.stop);
                encoder.load(kind, slots.scratch);
            }
        }
        Ok(())
    }

    fn emit_handler(encoder: &mut CodeEncoder, hooks: Hooks, slots: Slots) {
        encoder.store(ValueKind::Reference, slots.scratch);
        encoder.load(ValueKind::Reference, slots.context);
        encoder.load(ValueKind::Reference, slots.scratch);
        encoder.emit_indexed(opcodes::INVOKEVIRTUAL, hooks.stop_with_exception);
        encoder.load(ValueKind::Reference, slots.scratch);
        encoder.emit(opcodes::ATHROW);
    }

    fn rewrite_attributes(
        &mut self,
        target: &MethodTarget<'_>,
        code: &CodeAttribute,
        map: &OffsetMap,
        hooks: Hooks,
        region: ProtectedRegion,
    ) -> Result<Vec<Attribute>> {
        let mut attributes = Vec::with_capacity(code.attributes.len() + 1);
        let mut stack_map: Option<(usize, &[u8])> = None;

        for attribute in &code.attributes {
            let name = attribute.name(self.pool)?;
            match name.as_str() {
                STACK_MAP_TABLE => stack_map = Some((attributes.len(), &attribute.info)),
                LINE_NUMBER_TABLE | LOCAL_VARIABLE_TABLE | LOCAL_VARIABLE_TYPE_TABLE
                    if !self.config.keep_debug_tables =>
                {
                    log::debug!("{}: dropping {}", target.label, name);
                }
                LINE_NUMBER_TABLE => attributes.push(Attribute {
                    name_index: attribute.name_index,
                    info: remap_line_numbers(&attribute.info, map)?,
                }),
                LOCAL_VARIABLE_TABLE | LOCAL_VARIABLE_TYPE_TABLE => attributes.push(Attribute {
                    name_index: attribute.name_index,
                    info: remap_local_variables(&attribute.info, map)?,
                }),
                RUNTIME_VISIBLE_TYPE_ANNOTATIONS | RUNTIME_INVISIBLE_TYPE_ANNOTATIONS => {
                    log::warn!(
                        "{}: dropping {}, its code offsets cannot be remapped",
                        target.label,
                        name
                    );
                }
                _ => attributes.push(attribute.clone()),
            }
        }

        if self.stack_maps || stack_map.is_some() {
            let initial = initial_locals(
                self.this_class,
                target.is_static,
                false,
                target.descriptor,
                self.pool,
            )?;
            let layout = FrameLayout {
                initial: &initial,
                context_slot: code.max_locals,
                context: VerificationType::Object(hooks.context_class),
                throwable: VerificationType::Object(hooks.throwable),
                handler: region.handler,
            };
            let info = rewrite_stack_map(stack_map.map(|(_, info)| info), &layout, |offset| {
                map.get(offset)
            })?;
            let table = Attribute {
                name_index: self.pool.add_utf8(STACK_MAP_TABLE)?,
                info,
            };
            match stack_map {
                Some((position, _)) => attributes.insert(position, table),
                None => attributes.push(table),
            }
        }

        Ok(attributes)
    }
}

fn remap_line_numbers(info: &[u8], map: &OffsetMap) -> Result<Vec<u8>> {
    let entries = LineNumberEntry::parse_table(info)?
        .into_iter()
        .map(|entry| {
            Ok(LineNumberEntry {
                start_pc: map.get(entry.start_pc)?,
                line_number: entry.line_number,
            })
        })
        .collect::<Result<Vec<_>>>()?;
    LineNumberEntry::write_table(&entries)
}

/// Ranges starting at 0 keep starting at 0 so parameters stay visible across the prologue.
fn remap_local_variables(info: &[u8], map: &OffsetMap) -> Result<Vec<u8>> {
    let entries = LocalVariableEntry::parse_table(info)?
        .into_iter()
        .map(|entry| {
            let end = entry
                .start_pc
                .checked_add(entry.length)
                .ok_or_else(|| malformed_error!("Local variable range exceeds 65535"))?;
            let start_pc = if entry.start_pc == 0 {
                0
            } else {
                map.get(entry.start_pc)?
            };
            Ok(LocalVariableEntry {
                start_pc,
                length: map.get(end)? - start_pc,
                ..entry
            })
        })
        .collect::<Result<Vec<_>>>()?;
    LocalVariableEntry::write_table(&entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembly::FlowType;

    const OWNER: &str = "com/acme/Foo";

    struct Fixture {
        pool: ConstantPool,
        this_class: u16,
        config: WeaveConfig,
    }

    impl Fixture {
        fn new() -> Self {
            let mut pool = ConstantPool::new();
            let this_class = pool.add_class(OWNER).unwrap();
            Fixture {
                pool,
                this_class,
                config: WeaveConfig::default(),
            }
        }

        fn rewrite(
            &mut self,
            name: &str,
            descriptor: &str,
            is_static: bool,
            code: &CodeAttribute,
        ) -> Result<CodeAttribute> {
            let descriptor = MethodDescriptor::parse(descriptor).unwrap();
            let label = MonitoringLabel::new(OWNER, name, &descriptor);
            let target = MethodTarget {
                label: &label,
                descriptor: &descriptor,
                is_static,
            };
            MethodBodyRewriter::new(&mut self.pool, &self.config, self.this_class, true)
                .rewrite(&target, code)
        }

        fn invoked(&self, code: &[u8], opcode: u8) -> Vec<String> {
            decode_stream(code)
                .unwrap()
                .iter()
                .filter(|i| i.opcode == opcode)
                .map(|i| match i.operand {
                    Operand::Constant(index) => self.pool.member_ref(index).unwrap().1,
                    _ => unreachable!(),
                })
                .collect()
        }
    }

    fn body(
        max_stack: u16,
        max_locals: u16,
        build: impl FnOnce(&mut CodeEncoder),
    ) -> CodeAttribute {
        let mut encoder = CodeEncoder::new();
        build(&mut encoder);
        CodeAttribute {
            max_stack,
            max_locals,
            code: encoder.finish().unwrap(),
            exception_table: Vec::new(),
            attributes: Vec::new(),
        }
    }

    #[test]
    fn static_int_method() {
        let mut fixture = Fixture::new();
        let code = body(2, 1, |e| {
            e.emit(opcodes::ILOAD_0);
            e.emit(opcodes::ICONST_2);
            e.emit(opcodes::IMUL);
            e.emit(opcodes::IRETURN);
        });
        let woven = fixture.rewrite("twice", "(I)I", true, &code).unwrap();

        assert_eq!(woven.code[0], opcodes::ACONST_NULL);
        assert_eq!(woven.max_locals, 3);
        assert_eq!(woven.max_stack, 6);
        assert_eq!(
            fixture.invoked(&woven.code, opcodes::INVOKESTATIC),
            ["valueOf", "start", "valueOf"]
        );
        assert_eq!(
            fixture.invoked(&woven.code, opcodes::INVOKEVIRTUAL),
            ["stop", "stopWithException"]
        );

        let instructions = decode_stream(&woven.code).unwrap();
        assert_eq!(instructions.last().unwrap().opcode, opcodes::ATHROW);
        assert_eq!(
            instructions
                .iter()
                .filter(|i| i.flow_type == FlowType::Return)
                .count(),
            1
        );

        let region = woven.exception_table.last().unwrap();
        assert_eq!(woven.exception_table.len(), 1);
        assert_eq!(region.end_pc, region.handler_pc);
        assert_eq!(
            fixture.pool.class_name(region.catch_type).unwrap(),
            THROWABLE_CLASS
        );
        let handler = instructions
            .iter()
            .find(|i| i.offset == u32::from(region.handler_pc))
            .unwrap();
        assert_eq!(handler.opcode, opcodes::ASTORE_0 + 2);
    }

    #[test]
    fn wide_results_get_two_scratch_slots() {
        let mut fixture = Fixture::new();
        let code = body(2, 1, |e| {
            e.emit(opcodes::LCONST_1);
            e.emit(opcodes::LRETURN);
        });
        let woven = fixture.rewrite("one", "()J", false, &code).unwrap();
        assert_eq!(woven.code[0], opcodes::ALOAD_0);
        assert_eq!(woven.max_locals, 4);
        assert_eq!(woven.max_stack, 4);
    }

    #[test]
    fn branches_to_return_reach_exit_sequence() {
        let mut fixture = Fixture::new();
        let code = body(1, 1, |e| {
            let done = e.new_label();
            e.emit(opcodes::ILOAD_0);
            e.emit_branch(opcodes::IFEQ, done).unwrap();
            e.emit(opcodes::NOP);
            e.bind(done).unwrap();
            e.emit(opcodes::RETURN);
        });
        let woven = fixture.rewrite("check", "(Z)V", true, &code).unwrap();
        let instructions = decode_stream(&woven.code).unwrap();

        let branch = instructions
            .iter()
            .find(|i| i.opcode == opcodes::IFEQ)
            .unwrap();
        let landing = instructions
            .iter()
            .find(|i| i.offset == branch.branch_targets[0])
            .unwrap();
        // aload <ctx> with ctx in slot 1
        assert_eq!(landing.opcode, opcodes::ALOAD_1);
        let next = instructions
            .iter()
            .find(|i| i.offset == landing.next_offset())
            .unwrap();
        assert_eq!(next.opcode, opcodes::ACONST_NULL);
    }

    #[test]
    fn existing_handlers_keep_priority() {
        let mut fixture = Fixture::new();
        let mut code = body(1, 2, |e| {
            e.emit(opcodes::NOP);
            e.emit(opcodes::ACONST_NULL);
            e.emit(opcodes::ATHROW);
            e.emit(opcodes::ASTORE_1);
            e.emit(opcodes::RETURN);
        });
        code.exception_table.push(ExceptionTableEntry {
            start_pc: 0,
            end_pc: 3,
            handler_pc: 3,
            catch_type: 0,
        });
        let woven = fixture.rewrite("run", "()V", false, &code).unwrap();

        assert_eq!(woven.exception_table.len(), 2);
        let original = woven.exception_table[0];
        let region = woven.exception_table[1];
        assert!(original.start_pc >= region.start_pc);
        assert!(original.handler_pc < region.end_pc);
        assert_eq!(original.catch_type, 0);

        let instructions = decode_stream(&woven.code).unwrap();
        let at = |offset: u16| {
            instructions
                .iter()
                .find(|i| i.offset == u32::from(offset))
                .unwrap()
                .opcode
        };
        assert_eq!(at(original.start_pc), opcodes::NOP);
        assert_eq!(at(original.handler_pc), opcodes::ASTORE_1);
    }

    #[test]
    fn mismatched_return_is_rewrite_error() {
        let mut fixture = Fixture::new();
        let code = body(1, 1, |e| {
            e.emit(opcodes::ICONST_0);
            e.emit(opcodes::IRETURN);
        });
        let error = fixture.rewrite("broken", "()V", false, &code).unwrap_err();
        match error {
            Error::Rewrite { method, .. } => assert_eq!(method, "com.acme.Foo.broken()"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn debug_tables_follow_their_instructions() {
        let mut fixture = Fixture::new();
        let mut code = body(2, 2, |e| {
            e.emit(opcodes::ICONST_1);
            e.emit(opcodes::ISTORE_0 + 1);
            e.emit(opcodes::RETURN);
        });
        let lines = fixture.pool.add_utf8(LINE_NUMBER_TABLE).unwrap();
        let locals = fixture.pool.add_utf8(LOCAL_VARIABLE_TABLE).unwrap();
        code.attributes.push(Attribute {
            name_index: lines,
            info: LineNumberEntry::write_table(&[
                LineNumberEntry {
                    start_pc: 0,
                    line_number: 10,
                },
                LineNumberEntry {
                    start_pc: 2,
                    line_number: 11,
                },
            ])
            .unwrap(),
        });
        code.attributes.push(Attribute {
            name_index: locals,
            info: LocalVariableEntry::write_table(&[
                LocalVariableEntry {
                    start_pc: 0,
                    length: 3,
                    name_index: 1,
                    type_index: 1,
                    index: 0,
                },
                LocalVariableEntry {
                    start_pc: 2,
                    length: 1,
                    name_index: 1,
                    type_index: 1,
                    index: 1,
                },
            ])
            .unwrap(),
        });

        let woven = fixture.rewrite("run", "()V", false, &code).unwrap();
        let instructions = decode_stream(&woven.code).unwrap();
        let handler = woven.exception_table.last().unwrap().handler_pc;
        let opcode_at = |offset: u16| {
            instructions
                .iter()
                .find(|i| i.offset == u32::from(offset))
                .unwrap()
                .opcode
        };

        // Line table, local table, and the created stack map
        assert_eq!(woven.attributes.len(), 3);
        let line_entries = LineNumberEntry::parse_table(&woven.attributes[0].info).unwrap();
        assert_eq!(opcode_at(line_entries[0].start_pc), opcodes::ICONST_1);
        assert_eq!(opcode_at(line_entries[1].start_pc), opcodes::ALOAD_0 + 2);

        let local_entries = LocalVariableEntry::parse_table(&woven.attributes[1].info).unwrap();
        assert_eq!(local_entries[0].start_pc, 0);
        assert_eq!(local_entries[0].length, handler);
        assert_eq!(local_entries[1].start_pc + local_entries[1].length, handler);
        assert_eq!(
            woven.attributes[2].name(&fixture.pool).unwrap(),
            STACK_MAP_TABLE
        );
    }

    #[test]
    fn stripped_config_drops_debug_tables() {
        let mut fixture = Fixture::new();
        fixture.config = WeaveConfig::stripped();
        let mut code = body(0, 1, |e| e.emit(opcodes::RETURN));
        code.attributes.push(Attribute {
            name_index: fixture.pool.add_utf8(LINE_NUMBER_TABLE).unwrap(),
            info: LineNumberEntry::write_table(&[LineNumberEntry {
                start_pc: 0,
                line_number: 3,
            }])
            .unwrap(),
        });
        let woven = fixture.rewrite("run", "()V", false, &code).unwrap();
        assert_eq!(woven.attributes.len(), 1);
        assert_eq!(
            woven.attributes[0].name(&fixture.pool).unwrap(),
            STACK_MAP_TABLE
        );
    }

    #[test]
    fn switch_targets_are_relocated() {
        let mut fixture = Fixture::new();
        let code = body(1, 1, |e| {
            let one = e.new_label();
            let other = e.new_label();
            e.emit(opcodes::ILOAD_0);
            e.emit_tableswitch(other, 1, &[one]).unwrap();
            e.bind(one).unwrap();
            e.emit(opcodes::ICONST_1);
            e.emit(opcodes::IRETURN);
            e.bind(other).unwrap();
            e.emit(opcodes::ICONST_0);
            e.emit(opcodes::IRETURN);
        });
        let woven = fixture.rewrite("pick", "(I)I", true, &code).unwrap();
        let instructions = decode_stream(&woven.code).unwrap();
        let switch = instructions
            .iter()
            .find(|i| i.opcode == opcodes::TABLESWITCH)
            .unwrap();
        let opcode_at = |offset: u32| {
            instructions
                .iter()
                .find(|i| i.offset == offset)
                .unwrap()
                .opcode
        };
        assert_eq!(switch.branch_targets.len(), 2);
        assert_eq!(opcode_at(switch.branch_targets[0]), opcodes::ICONST_0);
        assert_eq!(opcode_at(switch.branch_targets[1]), opcodes::ICONST_1);
    }
}
