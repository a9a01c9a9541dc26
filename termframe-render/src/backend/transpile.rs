//! Shadertoy-style GLSL post shaders to WGSL.
//!
//! The user's `mainImage(out vec4, in vec2)` is wrapped in a GLSL 450
//! fragment shader, parsed and validated with naga, written back out as
//! WGSL and paired with a full-screen vertex stage.
//!
//! Bindings (group 0): `0` uniforms (`PostUniforms`), `1` the previous
//! pass as `iChannel0`, `2` its sampler.

use crate::error::RenderError;

/// Transpile `source` (named `name` in errors) into a complete WGSL module
/// with `vs_main` and `fs_main` entry points.
pub fn glsl_to_wgsl(name: &str, source: &str) -> Result<String, RenderError> {
    let wrapped = format!(
        r#"#version 450

layout(set = 0, binding = 0) uniform Uniforms {{
    vec4 _iResolution;
    float iTime;
    float iTimeDelta;
    int iFrame;
    float _pad0;
    vec4 iMouse;
    vec4 iDate;
}};

#define iResolution _iResolution.xyz

layout(set = 0, binding = 1) uniform texture2D _iChannel0Tex;
layout(set = 0, binding = 2) uniform sampler _iChannel0Sampler;

#define iChannel0 sampler2D(_iChannel0Tex, _iChannel0Sampler)

layout(location = 0) in vec2 v_uv;
layout(location = 0) out vec4 outColor;

{source}

void main() {{
    vec2 fragCoord = v_uv * _iResolution.xy;
    vec4 color;
    mainImage(color, fragCoord);
    outColor = color;
}}
"#
    );

    let mut frontend = naga::front::glsl::Frontend::default();
    let options = naga::front::glsl::Options::from(naga::ShaderStage::Fragment);
    let module = frontend
        .parse(&options, &wrapped)
        .map_err(|errors| RenderError::GlslParse {
            name: name.to_string(),
            details: errors
                .errors
                .iter()
                .map(|e| format!("  {:?}", e.kind))
                .collect::<Vec<_>>()
                .join("\n"),
        })?;

    let info = naga::valid::Validator::new(
        naga::valid::ValidationFlags::all(),
        naga::valid::Capabilities::all(),
    )
    .validate(&module)
    .map_err(|e| RenderError::ShaderValidation {
        name: name.to_string(),
        details: format!("{e:?}"),
    })?;

    let mut fragment = String::new();
    naga::back::wgsl::Writer::new(&mut fragment, naga::back::wgsl::WriterFlags::empty())
        .write(&module, &info)
        .map_err(|e| RenderError::WgslGeneration {
            name: name.to_string(),
            details: format!("{e:?}"),
        })?;
    let fragment = fragment.replace("fn main(", "fn fs_main(");

    Ok(format!(
        r#"// Generated from GLSL shader: {name}

struct PostVertexOutput {{
    @builtin(position) position: vec4<f32>,
    @location(0) uv: vec2<f32>,
}}

@vertex
fn vs_main(@builtin(vertex_index) vertex_index: u32) -> PostVertexOutput {{
    var out: PostVertexOutput;
    let x = f32(vertex_index & 1u);
    let y = f32((vertex_index >> 1u) & 1u);
    out.position = vec4<f32>(x * 2.0 - 1.0, 1.0 - y * 2.0, 0.0, 1.0);
    out.uv = vec2<f32>(x, y);
    return out;
}}

{fragment}
"#
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_passthrough_shader_transpiles() {
        let src = r#"
void mainImage(out vec4 fragColor, in vec2 fragCoord) {
    vec2 uv = fragCoord / iResolution.xy;
    fragColor = texture(iChannel0, uv);
}
"#;
        let wgsl = glsl_to_wgsl("passthrough", src).unwrap();
        assert!(wgsl.contains("fn vs_main("));
        assert!(wgsl.contains("fn fs_main("));
    }

    #[test]
    fn test_syntax_error_is_glsl_parse() {
        let err = glsl_to_wgsl("broken", "void mainImage(out vec4 c, in vec2 p) { c = ; }")
            .unwrap_err();
        assert!(matches!(err, RenderError::GlslParse { ref name, .. } if name == "broken"));
    }
}
