//! Declarative contract macro

/// Declare a module of typed procedure descriptors and its contract.
///
/// Each entry is `<kind> NAME: "dotted.path" => (Input, Output);` where kind is
/// `query`, `mutation` or `subscription`. The module also gets a `contract()`
/// function returning the matching [`Contract`](crate::Contract).
///
/// # Example
///
/// ```rust
/// use rpclink_client::procedures;
///
/// procedures! {
///     pub mod api {
///         query HELLO: "hello" => (String, String);
///         mutation CREATE_POST: "posts.create" => (serde_json::Value, u64);
///     }
/// }
///
/// assert_eq!(api::HELLO.path(), "hello");
/// assert_eq!(api::contract().len(), 2);
/// ```
#[macro_export]
macro_rules! procedures {
    (
        $vis:vis mod $module:ident {
            $( $kind:ident $name:ident : $path:literal => ($input:ty, $output:ty) ; )*
        }
    ) => {
        $vis mod $module {
            #[allow(unused_imports)]
            use super::*;

            $(
                pub const $name: $crate::Procedure<$input, $output> =
                    $crate::Procedure::$kind($path);
            )*

            pub fn contract() -> $crate::Contract {
                $crate::Contract::new()
                    $( .procedure(&$name) )*
            }
        }
    };
}
