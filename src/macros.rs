//! # Internal Macros
//!
//! ## le_accessors!
//!
//! On-disk headers store multi-byte integers as zerocopy little-endian
//! wrappers. `le_accessors!` generates a native getter and a `set_` method for
//! each listed field so callers never touch the wrapper types.
//!
//! ```ignore
//! impl Superblock {
//!     le_accessors! {
//!         eoa: u64,
//!         sym_leaf_k: u16,
//!     }
//! }
//!
//! // sb.eoa() -> u64, sb.set_eoa(v), sb.sym_leaf_k() -> u16, sb.set_sym_leaf_k(v)
//! ```

#[macro_export]
macro_rules! le_accessors {
    (@impl $field:ident, $native:ty, $wrapper:ident) => {
        ::paste::paste! {
            #[inline]
            pub fn $field(&self) -> $native {
                self.$field.get()
            }

            #[inline]
            pub fn [<set_ $field>](&mut self, val: $native) {
                self.$field = ::zerocopy::little_endian::$wrapper::new(val);
            }
        }
    };
    (@dispatch $field:ident, u16) => {
        $crate::le_accessors!(@impl $field, u16, U16);
    };
    (@dispatch $field:ident, u32) => {
        $crate::le_accessors!(@impl $field, u32, U32);
    };
    (@dispatch $field:ident, u64) => {
        $crate::le_accessors!(@impl $field, u64, U64);
    };
    ($($field:ident : $ty:tt),* $(,)?) => {
        $(
            $crate::le_accessors!(@dispatch $field, $ty);
        )*
    };
}
