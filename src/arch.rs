#[cfg(target_pointer_width = "32")]
pub mod size {
  use size::consts::GIBIBYTE;
  use size::Size;

  pub const MAX_MAP_SIZE: Size = Size::from_const(2 * GIBIBYTE);
}

#[cfg(target_pointer_width = "64")]
pub mod size {
  use size::consts::TEBIBYTE;
  use size::Size;

  pub const MAX_MAP_SIZE: Size = Size::from_const(256 * TEBIBYTE);
}
