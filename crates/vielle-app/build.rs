// SPDX-License-Identifier: CEPL-1.0
// Compiles the demo scene shaders to SPIR-V in OUT_DIR; main.rs reads them
// back by path at startup.
use std::{env, fs, path::PathBuf};

// A spinning textured triangle. Positions and UVs come from gl_VertexIndex,
// so no vertex buffers are bound.
const SCENE_VERT: &str = r#"
#version 450
layout(set = 0, binding = 0) uniform Scene {
    mat4 transform;
    vec4 params;
} scene;

layout(location = 0) out vec2 v_uv;
layout(location = 1) out vec3 v_dir;

const vec2 POSITIONS[3] = vec2[](vec2(0.0, -0.8), vec2(0.75, 0.6), vec2(-0.75, 0.6));
const vec2 UVS[3] = vec2[](vec2(0.5, 0.0), vec2(1.0, 1.0), vec2(0.0, 1.0));

void main() {
    vec2 p = POSITIONS[gl_VertexIndex];
    v_uv = UVS[gl_VertexIndex] * 2.0;
    v_dir = (scene.transform * vec4(p, 1.0, 0.0)).xyz;
    gl_Position = scene.transform * vec4(p, 0.0, 1.0);
}
"#;

// params.y > 0.5 when the cubemap binding holds an image.
const SCENE_FRAG: &str = r#"
#version 450
layout(set = 0, binding = 0) uniform Scene {
    mat4 transform;
    vec4 params;
} scene;
layout(set = 0, binding = 1) uniform sampler2D u_texture;
layout(set = 0, binding = 2) uniform samplerCube u_sky;

layout(location = 0) in vec2 v_uv;
layout(location = 1) in vec3 v_dir;
layout(location = 0) out vec4 out_color;

void main() {
    vec4 color = texture(u_texture, v_uv);
    if (scene.params.y > 0.5) {
        color.rgb = mix(color.rgb, texture(u_sky, normalize(v_dir)).rgb, 0.5);
    }
    out_color = color;
}
"#;

fn main() {
    let out = PathBuf::from(env::var("OUT_DIR").expect("OUT_DIR is set by cargo"));

    let compiler = shaderc::Compiler::new().expect("shaderc compiler");
    let mut opts = shaderc::CompileOptions::new().expect("shaderc options");
    opts.set_target_env(
        shaderc::TargetEnv::Vulkan,
        shaderc::EnvVersion::Vulkan1_3 as u32,
    );
    opts.set_optimization_level(shaderc::OptimizationLevel::Performance);

    for (name, kind, source) in [
        ("scene.vert", shaderc::ShaderKind::Vertex, SCENE_VERT),
        ("scene.frag", shaderc::ShaderKind::Fragment, SCENE_FRAG),
    ] {
        let spirv = compiler
            .compile_into_spirv(source, kind, name, "main", Some(&opts))
            .unwrap_or_else(|e| panic!("{name}: {e}"));
        fs::write(out.join(format!("{name}.spv")), spirv.as_binary_u8())
            .unwrap_or_else(|e| panic!("writing {name}.spv: {e}"));
    }

    println!("cargo:rerun-if-changed=build.rs");
}
