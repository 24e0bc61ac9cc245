//! Effect management: a linked program plus its named-uniform registry and
//! the float/int register banks backing uniform storage. Render code stages
//! values with the typed setters; `begin`/`commit_changes` flush dirty
//! registers to the device in one pass.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use glam::Mat4;

use corelib::{GfxError, GfxResult};

use crate::bank::RegisterBank;
use crate::device::{GraphicsDevice, ProgramId, ShaderStage, UniformType};

/// Longest accepted uniform name in bytes. Longer names are rejected with an
/// error instead of overflowing a fixed buffer.
pub const MAX_UNIFORM_NAME: usize = 64;

/// Well-known attribute names and their fixed semantic slots. Shaders opt in
/// by naming attributes `my_<semantic>`; anything else cannot be bound
/// automatically.
const ATTRIBUTE_SLOTS: &[(&str, u32)] = &[
    ("my_Position", 0),
    ("my_Normal", 1),
    ("my_Tangent", 2),
    ("my_Binormal", 3),
    ("my_Color", 4),
    ("my_Texcoord0", 5),
    ("my_Texcoord1", 6),
    ("my_Texcoord2", 7),
    ("my_Texcoord3", 8),
    ("my_Texcoord4", 9),
    ("my_Texcoord5", 10),
    ("my_Texcoord6", 11),
    ("my_Texcoord7", 12),
];

/// Fragment output names bound to render targets 0..3.
const FRAG_OUTPUTS: [&str; 4] = [
    "my_FragColor0",
    "my_FragColor1",
    "my_FragColor2",
    "my_FragColor3",
];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum BankKind {
    Float,
    Int,
}

fn classify(ty: UniformType) -> Option<BankKind> {
    match ty {
        UniformType::Float
        | UniformType::FloatVec2
        | UniformType::FloatVec3
        | UniformType::FloatVec4
        | UniformType::FloatMat4 => Some(BankKind::Float),
        UniformType::Int
        | UniformType::IntVec2
        | UniformType::IntVec3
        | UniformType::IntVec4
        | UniformType::Sampler2D
        | UniformType::Image2D => Some(BankKind::Int),
        _ => None,
    }
}

/// One registered shader parameter. `start_register` indexes the bank the
/// uniform was classified into; register ranges of distinct uniforms never
/// overlap.
#[derive(Clone, Debug)]
pub struct Uniform {
    pub ty: UniformType,
    pub location: u32,
    pub register_count: u32,
    pub start_register: u32,
    dirty: bool,
}

/// A linked program with its uniform registry and value banks.
#[derive(Debug)]
pub struct Effect {
    program: ProgramId,
    uniforms: BTreeMap<String, Uniform>,
    float_bank: RegisterBank<f32>,
    int_bank: RegisterBank<i32>,
}

impl Effect {
    /// Wrap an already-linked program. `bind_attributes` and
    /// `query_uniforms` still have to run before the first draw.
    pub fn new(program: ProgramId) -> Self {
        Self {
            program,
            uniforms: BTreeMap::new(),
            float_bank: RegisterBank::new(),
            int_bank: RegisterBank::new(),
        }
    }

    pub fn program(&self) -> ProgramId {
        self.program
    }

    /// Registered uniform metadata, if `name` is known.
    pub fn uniform(&self, name: &str) -> Option<&Uniform> {
        self.uniforms.get(name)
    }

    /// Staged float components of a float-family uniform.
    pub fn float_registers(&self, name: &str) -> Option<&[f32]> {
        let uni = self.uniforms.get(name)?;
        match classify(uni.ty) {
            Some(BankKind::Float) => {
                Some(self.float_bank.registers(uni.start_register, uni.register_count))
            }
            _ => None,
        }
    }

    /// Register a uniform. Matrix uniforms always claim 4 registers; other
    /// types claim `count`. The first registration of a name wins; a second
    /// one is rejected with [`GfxError::DuplicateUniform`].
    pub fn add_uniform(
        &mut self,
        name: &str,
        location: u32,
        count: u32,
        ty: UniformType,
    ) -> GfxResult<()> {
        if name.len() > MAX_UNIFORM_NAME {
            return Err(GfxError::UniformNameTooLong {
                name: name.to_owned(),
                max: MAX_UNIFORM_NAME,
            });
        }
        if self.uniforms.contains_key(name) {
            return Err(GfxError::DuplicateUniform(name.to_owned()));
        }

        let kind = classify(ty).ok_or_else(|| GfxError::UnsupportedUniformType {
            name: name.to_owned(),
            ty: format!("{:?}", ty),
        })?;

        // A 4x4 matrix is stored as 4 contiguous vec4 registers.
        let register_count = if ty == UniformType::FloatMat4 { 4 } else { count };

        let start_register = match kind {
            BankKind::Float => self.float_bank.alloc(register_count),
            BankKind::Int => self.int_bank.alloc(register_count),
        };

        self.uniforms.insert(
            name.to_owned(),
            Uniform {
                ty,
                location,
                register_count,
                start_register,
                dirty: true,
            },
        );
        Ok(())
    }

    /// Rebuild the registry from the program's active uniforms. Array
    /// elements (`name[i]`) fold into one entry per base name: the first
    /// enumerated element survives, later ones are skipped. Bank storage is
    /// never reclaimed here; offsets of re-added uniforms simply move.
    pub fn query_uniforms(&mut self, device: &mut dyn GraphicsDevice) -> GfxResult<()> {
        self.uniforms.clear();

        for info in device.active_uniforms(self.program) {
            let Some(location) = device.uniform_location(self.program, &info.name) else {
                continue;
            };
            let base = match info.name.find('[') {
                Some(pos) => &info.name[..pos],
                None => info.name.as_str(),
            };

            match self.add_uniform(base, location, info.size, info.ty) {
                Ok(()) => {}
                Err(GfxError::DuplicateUniform(name)) => {
                    log::debug!("uniform '{}' folds into an already-registered entry", name);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Bind well-known attributes and fragment outputs to their fixed slots,
    /// then re-link so the bindings take effect. Must run after compilation
    /// and before the program is used for a draw.
    pub fn bind_attributes(&mut self, device: &mut dyn GraphicsDevice) -> GfxResult<()> {
        for attrib in device.active_attributes(self.program) {
            let location = device.attribute_location(self.program, &attrib.name);
            let slot = ATTRIBUTE_SLOTS
                .iter()
                .find(|(name, _)| *name == attrib.name)
                .map(|&(_, slot)| slot);

            match (location, slot) {
                (Some(_), Some(slot)) => {
                    device.bind_attribute_location(self.program, slot, &attrib.name);
                }
                _ => {
                    log::warn!(
                        "attribute '{}' has no known semantic; name it my_<semantic> to bind it automatically",
                        attrib.name
                    );
                }
            }
        }

        let targets = device.max_draw_buffers().min(FRAG_OUTPUTS.len() as u32);
        for (slot, name) in FRAG_OUTPUTS.iter().enumerate().take(targets as usize) {
            device.bind_frag_data_location(self.program, slot as u32, name);
        }

        device.link_program(self.program)
    }

    /// Activate the program and flush every staged value.
    pub fn begin(&mut self, device: &mut dyn GraphicsDevice) {
        device.use_program(self.program);
        self.commit_changes(device);
    }

    /// Upload all dirty uniforms and clear their dirty flags. Uniforms whose
    /// values didn't change since the last commit are not re-sent.
    pub fn commit_changes(&mut self, device: &mut dyn GraphicsDevice) {
        for uni in self.uniforms.values_mut() {
            if !uni.dirty {
                continue;
            }
            uni.dirty = false;

            match uni.ty {
                UniformType::Float => device.set_uniform_floats(
                    uni.location,
                    1,
                    uni.register_count,
                    self.float_bank.registers(uni.start_register, uni.register_count),
                ),
                UniformType::FloatVec2 => device.set_uniform_floats(
                    uni.location,
                    2,
                    uni.register_count,
                    self.float_bank.registers(uni.start_register, uni.register_count),
                ),
                UniformType::FloatVec3 => device.set_uniform_floats(
                    uni.location,
                    3,
                    uni.register_count,
                    self.float_bank.registers(uni.start_register, uni.register_count),
                ),
                UniformType::FloatVec4 => device.set_uniform_floats(
                    uni.location,
                    4,
                    uni.register_count,
                    self.float_bank.registers(uni.start_register, uni.register_count),
                ),
                UniformType::FloatMat4 => device.set_uniform_matrices(
                    uni.location,
                    uni.register_count / 4,
                    self.float_bank.registers(uni.start_register, uni.register_count),
                ),
                UniformType::Sampler2D => device.set_uniform_int(
                    uni.location,
                    self.int_bank.registers(uni.start_register, 1)[0],
                ),
                // Plain int vectors and images are staged but have no batch
                // upload here.
                _ => {}
            }
        }
    }

    /// Reserved for state restoration; begin/end pairs stay symmetric.
    pub fn end(&mut self) {}

    /// Stage up to RegisterCount x 4 float components. Unknown names are a
    /// soft no-op, reported through the log only.
    pub fn set_vector(&mut self, name: &str, value: &[f32]) {
        let Some(uni) = self.uniforms.get_mut(name) else {
            log::debug!("set_vector: no uniform named '{}'", name);
            return;
        };
        if classify(uni.ty) != Some(BankKind::Float) {
            log::debug!("set_vector: uniform '{}' is not float-family", name);
            return;
        }

        let regs = self
            .float_bank
            .registers_mut(uni.start_register, uni.register_count);
        let n = regs.len().min(value.len());
        regs[..n].copy_from_slice(&value[..n]);
        uni.dirty = true;
    }

    /// Alias over `set_vector`: a 4x4 matrix is 4 contiguous vec4 registers.
    /// The upload shape is chosen by the registered type, not the setter.
    pub fn set_matrix(&mut self, name: &str, value: &Mat4) {
        self.set_vector(name, &value.to_cols_array());
    }

    pub fn set_float(&mut self, name: &str, value: f32) {
        let Some(uni) = self.uniforms.get_mut(name) else {
            log::debug!("set_float: no uniform named '{}'", name);
            return;
        };
        if classify(uni.ty) != Some(BankKind::Float) {
            log::debug!("set_float: uniform '{}' is not float-family", name);
            return;
        }
        self.float_bank.registers_mut(uni.start_register, 1)[0] = value;
        uni.dirty = true;
    }

    pub fn set_int(&mut self, name: &str, value: i32) {
        let Some(uni) = self.uniforms.get_mut(name) else {
            log::debug!("set_int: no uniform named '{}'", name);
            return;
        };
        if classify(uni.ty) != Some(BankKind::Int) {
            log::debug!("set_int: uniform '{}' is not int-family", name);
            return;
        }
        self.int_bank.registers_mut(uni.start_register, 1)[0] = value;
        uni.dirty = true;
    }

    /// Release the program. Registry and banks drop with the value.
    pub fn destroy(&mut self, device: &mut dyn GraphicsDevice) {
        device.delete_program(self.program);
    }
}

/// Compile and link a vertex+fragment effect from source strings. On any
/// failure every object created so far is released; nothing leaks.
pub fn create_effect(
    device: &mut dyn GraphicsDevice,
    vs_source: &str,
    fs_source: &str,
) -> GfxResult<Effect> {
    let vertex = device.compile_shader(ShaderStage::Vertex, vs_source)?;

    let fragment = match device.compile_shader(ShaderStage::Fragment, fs_source) {
        Ok(s) => s,
        Err(e) => {
            device.delete_shader(vertex);
            return Err(e);
        }
    };

    let program = match device.create_program() {
        Ok(p) => p,
        Err(e) => {
            device.delete_shader(vertex);
            device.delete_shader(fragment);
            return Err(e);
        }
    };
    device.attach_shader(program, vertex);
    device.attach_shader(program, fragment);

    if let Err(e) = device.link_program(program) {
        device.delete_program(program);
        device.delete_shader(vertex);
        device.delete_shader(fragment);
        return Err(e);
    }

    // Binding first: it re-links, and locations only exist after a link.
    let mut effect = Effect::new(program);
    let post = effect
        .bind_attributes(device)
        .and_then(|()| effect.query_uniforms(device));

    device.delete_shader(vertex);
    device.delete_shader(fragment);

    if let Err(e) = post {
        effect.destroy(device);
        return Err(e);
    }
    Ok(effect)
}

/// Whole-file variant of [`create_effect`].
pub fn create_effect_from_file(
    device: &mut dyn GraphicsDevice,
    vs_path: impl AsRef<Path>,
    fs_path: impl AsRef<Path>,
) -> GfxResult<Effect> {
    let vs_source = fs::read_to_string(vs_path)?;
    let fs_source = fs::read_to_string(fs_path)?;
    create_effect(device, &vs_source, &fs_source)
}

/// Single-stage compute variant: no attribute binding, introspection only.
pub fn create_compute_effect(device: &mut dyn GraphicsDevice, cs_source: &str) -> GfxResult<Effect> {
    let shader = device.compile_shader(ShaderStage::Compute, cs_source)?;

    let program = match device.create_program() {
        Ok(p) => p,
        Err(e) => {
            device.delete_shader(shader);
            return Err(e);
        }
    };
    device.attach_shader(program, shader);

    if let Err(e) = device.link_program(program) {
        device.delete_program(program);
        device.delete_shader(shader);
        return Err(e);
    }

    let mut effect = Effect::new(program);
    let post = effect.query_uniforms(device);
    device.delete_shader(shader);

    if let Err(e) = post {
        effect.destroy(device);
        return Err(e);
    }
    Ok(effect)
}

/// Whole-file variant of [`create_compute_effect`].
pub fn create_compute_effect_from_file(
    device: &mut dyn GraphicsDevice,
    cs_path: impl AsRef<Path>,
) -> GfxResult<Effect> {
    let cs_source = fs::read_to_string(cs_path)?;
    create_compute_effect(device, &cs_source)
}
