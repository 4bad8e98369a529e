pub mod descriptor;
pub mod job;
pub mod key;

pub use descriptor::{
    ConstructError, Constructors, Context, DescriptorError, Manager, ManagerConstructor,
    ManagerHandle, ModuleBuilder, ModuleDescriptor, Repository, RepositoryConstructor,
    RepositoryHandle, RepositoryWithSecondaryConstructor, TypeDescriptor, TypeRole,
};
pub use job::Job;
pub use key::{normalize, CategoryId, KeyError, TypeKey};

/// Bumped whenever the layout of [`ModuleDeclaration`] or the types it hands
/// across the library boundary change.
pub const ABI_VERSION: u32 = 1;

/// Name of the static a dynamic module exports, NUL-terminated for symbol lookup.
pub const MODULE_SYMBOL: &[u8] = b"JOBPLUG_MODULE\0";

/// Entry point a dynamic module exports through [`export_module!`].
pub struct ModuleDeclaration {
    pub abi_version: u32,
    pub register: fn(&mut ModuleBuilder),
}

/// Export a module's register function from a `cdylib`.
///
/// ```ignore
/// fn register(module: &mut jobplug_abi::ModuleBuilder) {
///     module.job("Jobs.Invoice", build_invoice_job);
/// }
///
/// jobplug_abi::export_module!(register);
/// ```
#[macro_export]
macro_rules! export_module {
    ($register:path) => {
        #[no_mangle]
        pub static JOBPLUG_MODULE: $crate::ModuleDeclaration = $crate::ModuleDeclaration {
            abi_version: $crate::ABI_VERSION,
            register: $register,
        };
    };
}
