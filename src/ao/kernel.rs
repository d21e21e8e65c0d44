//! SSAO sample kernel and noise generation.

/// Side length of the tiled noise texture.
pub const NOISE_DIM: u32 = 4;

/// Deterministic LCG, good enough for kernel jitter.
struct Lcg(u32);

impl Lcg {
    fn next_f32(&mut self) -> f32 {
        self.0 = self.0.wrapping_mul(1664525).wrapping_add(1013904223);
        (self.0 >> 8) as f32 / (1 << 24) as f32
    }
}

/// Generate a cosine-weighted hemisphere kernel of `size` samples,
/// oriented along +Z. Samples are scaled so they cluster toward the
/// origin, which weights nearby occluders more heavily.
pub fn generate_kernel(size: u32) -> Vec<[f32; 4]> {
    let mut rng = Lcg(0x9e3779b9);
    (0..size)
        .map(|i| {
            // Rejection-sampled direction in the upper hemisphere,
            // then pulled toward the origin quadratically.
            let mut x;
            let mut y;
            let mut z;
            loop {
                x = rng.next_f32() * 2.0 - 1.0;
                y = rng.next_f32() * 2.0 - 1.0;
                z = rng.next_f32();
                let len_sq = x * x + y * y + z * z;
                if len_sq > 1e-4 && len_sq <= 1.0 {
                    let len = len_sq.sqrt();
                    x /= len;
                    y /= len;
                    z /= len;
                    break;
                }
            }
            let t = i as f32 / size as f32;
            let scale = 0.1 + 0.9 * t * t;
            [x * scale, y * scale, z * scale, 0.0]
        })
        .collect()
}

/// Generate the 4x4 tiled rotation noise as RGBA8 texel data. Each
/// texel encodes a random unit vector in the XY plane, used to rotate
/// the kernel per pixel and break banding.
pub fn generate_noise() -> Vec<u8> {
    let mut rng = Lcg(0x85ebca6b);
    let mut data = Vec::with_capacity((NOISE_DIM * NOISE_DIM * 4) as usize);
    for _ in 0..NOISE_DIM * NOISE_DIM {
        let angle = rng.next_f32() * std::f32::consts::TAU;
        let x = angle.cos() * 0.5 + 0.5;
        let y = angle.sin() * 0.5 + 0.5;
        data.push((x * 255.0) as u8);
        data.push((y * 255.0) as u8);
        data.push(0);
        data.push(255);
    }
    data
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kernel_size_and_hemisphere() {
        let kernel = generate_kernel(32);
        assert_eq!(kernel.len(), 32);
        for sample in &kernel {
            // Everything stays in the +Z hemisphere, inside the unit ball.
            assert!(sample[2] >= 0.0);
            let len = (sample[0] * sample[0] + sample[1] * sample[1] + sample[2] * sample[2])
                .sqrt();
            assert!(len <= 1.0 + 1e-5);
            assert!(len > 0.0);
        }
    }

    #[test]
    fn test_kernel_clusters_near_origin() {
        let kernel = generate_kernel(64);
        let near: Vec<f32> = kernel[..8]
            .iter()
            .map(|s| (s[0] * s[0] + s[1] * s[1] + s[2] * s[2]).sqrt())
            .collect();
        let far: Vec<f32> = kernel[56..]
            .iter()
            .map(|s| (s[0] * s[0] + s[1] * s[1] + s[2] * s[2]).sqrt())
            .collect();
        let near_avg: f32 = near.iter().sum::<f32>() / near.len() as f32;
        let far_avg: f32 = far.iter().sum::<f32>() / far.len() as f32;
        assert!(near_avg < far_avg);
    }

    #[test]
    fn test_kernel_is_deterministic() {
        assert_eq!(generate_kernel(16), generate_kernel(16));
    }

    #[test]
    fn test_noise_dimensions() {
        let noise = generate_noise();
        assert_eq!(noise.len(), (NOISE_DIM * NOISE_DIM * 4) as usize);
    }
}
