/*++

Licensed under the Apache-2.0 license.

File Name:

    printer.rs

Abstract:

    File contains support routines and macros to print driver diagnostics.

--*/
use core::convert::Infallible;
use ufmt::{uDisplay, uWrite};

#[derive(Default)]
pub struct Printer;

impl uWrite for Printer {
    type Error = Infallible;

    /// Writes a string slice into this writer, returning whether the write succeeded.
    fn write_str(&mut self, _str: &str) -> Result<(), Self::Error> {
        cfg_if::cfg_if! {
            if #[cfg(feature = "std")] {
                print!("{_str}");
            }
        }
        Ok(())
    }
}

#[macro_export]
macro_rules! cprintln {
    ($($tt:tt)*) => {{
        let _ = ufmt::uwriteln!(&mut $crate::printer::Printer::default(), $($tt)*);
    }}
}

/// Error code printed as `0x` followed by eight hex digits.
pub struct ErrorCode(pub u32);

impl uDisplay for ErrorCode {
    fn fmt<W>(&self, f: &mut ufmt::Formatter<'_, W>) -> Result<(), W::Error>
    where
        W: uWrite + ?Sized,
    {
        f.write_str("0x")?;
        for shift in (0..8).rev() {
            let c = ((self.0 >> (shift * 4)) & 0xf) as u8;
            if c < 10 {
                f.write_char((c + b'0') as char)?;
            } else {
                f.write_char((c - 10 + b'a') as char)?;
            }
        }
        Ok(())
    }
}

impl From<seceng_error::SecEngError> for ErrorCode {
    fn from(err: seceng_error::SecEngError) -> Self {
        Self(err.into())
    }
}
