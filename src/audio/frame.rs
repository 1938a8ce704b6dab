// The smallest unit of audio; one stereo frame
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct StereoFrame {
    pub left: f32,
    pub right: f32,
}

impl StereoFrame {
    pub fn zero() -> Self {
        Self::default()
    }

    // the graph renders mono, both channels get the same signal
    pub fn mono(v: f32) -> Self {
        Self { left: v, right: v }
    }
}
