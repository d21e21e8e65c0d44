//! Unit-sphere proxy mesh for point-light volume rendering.

/// A CPU-built triangle mesh: positions only, `u32` indices.
pub struct SphereMesh {
    /// Vertex positions on the unit sphere.
    pub positions: Vec<[f32; 3]>,
    /// Triangle list indices.
    pub indices: Vec<u32>,
}

/// Build a UV sphere of radius 1 centered at the origin.
///
/// The proxy only masks stencil pixels, so a coarse tessellation is
/// enough; callers scale it slightly above 1 to cover the silhouette
/// error of the flat faces.
pub fn generate_sphere(stacks: u32, sectors: u32) -> SphereMesh {
    let stacks = stacks.max(3);
    let sectors = sectors.max(3);

    let mut positions = Vec::with_capacity(((stacks + 1) * (sectors + 1)) as usize);
    for stack in 0..=stacks {
        let phi = std::f32::consts::PI * stack as f32 / stacks as f32;
        let (sin_phi, cos_phi) = phi.sin_cos();
        for sector in 0..=sectors {
            let theta = 2.0 * std::f32::consts::PI * sector as f32 / sectors as f32;
            let (sin_theta, cos_theta) = theta.sin_cos();
            positions.push([sin_phi * cos_theta, cos_phi, sin_phi * sin_theta]);
        }
    }

    let mut indices = Vec::with_capacity((stacks * sectors * 6) as usize);
    let row = sectors + 1;
    for stack in 0..stacks {
        for sector in 0..sectors {
            let a = stack * row + sector;
            let b = a + row;
            // Degenerate triangles at the poles are skipped.
            if stack != 0 {
                indices.extend_from_slice(&[a, b, a + 1]);
            }
            if stack != stacks - 1 {
                indices.extend_from_slice(&[a + 1, b, b + 1]);
            }
        }
    }

    SphereMesh { positions, indices }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vertices_on_unit_sphere() {
        let mesh = generate_sphere(8, 12);
        for p in &mesh.positions {
            let len = (p[0] * p[0] + p[1] * p[1] + p[2] * p[2]).sqrt();
            assert!((len - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn test_indices_in_bounds() {
        let mesh = generate_sphere(6, 8);
        let count = mesh.positions.len() as u32;
        assert!(mesh.indices.iter().all(|&i| i < count));
        assert_eq!(mesh.indices.len() % 3, 0);
    }

    #[test]
    fn test_triangle_count() {
        let stacks = 8u32;
        let sectors = 12u32;
        let mesh = generate_sphere(stacks, sectors);
        // Two triangles per quad except the single-triangle pole rows.
        let expected = (2 * stacks * sectors - 2 * sectors) as usize;
        assert_eq!(mesh.indices.len() / 3, expected);
    }
}
