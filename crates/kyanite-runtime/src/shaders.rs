//! WGSL kernel sources.
//!
//! Sources are embedded at build time and composed with `naga_oil` at
//! compile time, with the workgroup size supplied as a shader def.

/// Get the raw WGSL source for a kernel.
pub fn shader_source(name: &str) -> Option<&'static str> {
    match name {
        "elementwise_add" => Some(include_str!("../shaders/elementwise_add.wgsl")),
        "elementwise_multiply" => Some(include_str!("../shaders/elementwise_multiply.wgsl")),
        "identity" => Some(include_str!("../shaders/identity.wgsl")),
        "fill_zero" => Some(include_str!("../shaders/fill_zero.wgsl")),
        "noop" => Some(include_str!("../shaders/noop.wgsl")),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shader_sources_available() {
        for name in [
            "elementwise_add",
            "elementwise_multiply",
            "identity",
            "fill_zero",
            "noop",
        ] {
            let source = shader_source(name).unwrap_or_else(|| panic!("missing kernel {name}"));
            assert!(source.contains("@compute"), "{name} has no compute entry");
        }
        assert!(shader_source("conv2d").is_none());
    }
}
