use std::fmt;
use std::sync::Arc;

/// Similar to `write!` but allows some external context to be used during formatting
#[macro_export]
macro_rules! cwrite {
    ($dst:expr, $ctx:expr) => {
        {
            write!($dst)
        }
    };
    ($dst:expr, $ctx:expr, $fmtstr:literal) => {
        {
            write!($dst, $fmtstr)
        }
    };
    ($dst:expr, $ctx:expr, $fmtstr:literal, $($arg:expr),*) => {
        {
            let ctx = $ctx;
            write!($dst, $fmtstr, $($crate::fmt_ctx::DisplayWith {
                ctx,
                value: &$arg,
            }),*)
        }
    };
}

/// Similar to `writeln!` but allows some external context to be used during formatting
#[macro_export]
macro_rules! cwriteln {
    ($dst:expr, $ctx:expr) => {
        {
            writeln!($dst)
        }
    };
    ($dst:expr, $ctx:expr, $fmtstr:literal) => {
        {
            writeln!($dst, $fmtstr)
        }
    };
    ($dst:expr, $ctx:expr, $fmtstr:literal, $($arg:expr),*) => {
        {
            let ctx = $ctx;
            writeln!($dst, $fmtstr, $($crate::fmt_ctx::DisplayWith {
                ctx,
                value: &$arg,
            }),*)
        }
    };
}

/// Similar to `format!` but allows some external context to be used during formatting
#[macro_export]
macro_rules! cformat {
    ($ctx:expr) => {
        {
            format!()
        }
    };
    ($ctx:expr, $fmtstr:literal) => {
        {
            format!($fmtstr)
        }
    };
    ($ctx:expr, $fmtstr:literal, $($arg:expr),*) => {
        {
            let ctx = $ctx;
            format!($fmtstr, $($crate::fmt_ctx::DisplayWith {
                ctx,
                value: &$arg,
            }),*)
        }
    };
}

/// Similar to `std::fmt::Display` but allows some external context to be used during formatting
pub trait DisplayCtx<Ctx> {
    fn fmt_ctx(&self, f: &mut fmt::Formatter<'_>, ctx: &Ctx) -> fmt::Result;
}

impl<Ctx, T: ?Sized + DisplayCtx<Ctx>> DisplayCtx<Ctx> for &T {
    fn fmt_ctx(&self, f: &mut fmt::Formatter<'_>, ctx: &Ctx) -> fmt::Result {
        DisplayCtx::fmt_ctx(&**self, f, ctx)
    }
}

impl<Ctx, T> DisplayCtx<Ctx> for Arc<T>
    where T: DisplayCtx<Ctx> + ?Sized,
{
    fn fmt_ctx(&self, f: &mut fmt::Formatter<'_>, ctx: &Ctx) -> fmt::Result {
        DisplayCtx::fmt_ctx(&**self, f, ctx)
    }
}

impl<Ctx> DisplayCtx<Ctx> for str {
    fn fmt_ctx(&self, f: &mut fmt::Formatter<'_>, _ctx: &Ctx) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl<Ctx> DisplayCtx<Ctx> for usize {
    fn fmt_ctx(&self, f: &mut fmt::Formatter<'_>, _ctx: &Ctx) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl<Ctx> DisplayCtx<Ctx> for bool {
    fn fmt_ctx(&self, f: &mut fmt::Formatter<'_>, _ctx: &Ctx) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// Displays a value with the given context
pub struct DisplayWith<'a, Ctx, T> {
    pub ctx: &'a Ctx,
    pub value: &'a T,
}

impl<'a, Ctx, T: DisplayCtx<Ctx>> fmt::Display for DisplayWith<'a, Ctx, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Self {ctx, value} = self;
        value.fmt_ctx(f, ctx)
    }
}
