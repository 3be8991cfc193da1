use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::{format_ident, quote};
use syn::{ImplItemFn, Meta, Token, parse::Parser, parse_macro_input, punctuated::Punctuated};

type AttrArgs = Punctuated<Meta, Token![,]>;

fn extract_optional(args: &AttrArgs, name: &str) -> Option<String> {
    args.iter().find_map(|meta| match meta {
        Meta::NameValue(nv) if nv.path.is_ident(name) => match &nv.value {
            syn::Expr::Lit(syn::ExprLit {
                lit: syn::Lit::Str(s),
                ..
            }) => Some(s.value()),
            _ => None,
        },
        _ => None,
    })
}

fn extract(args: &AttrArgs, name: &str) -> String {
    extract_optional(args, name)
        .unwrap_or_else(|| panic!("Missing required attribute: {} = \"...\"", name))
}

/// Marker for methods exported by `#[service]`. Expands to the method unchanged.
#[proc_macro_attribute]
pub fn function(_attr: TokenStream, item: TokenStream) -> TokenStream {
    item
}

fn handler_for(service: Option<&str>, method: &ImplItemFn, metas: &AttrArgs) -> TokenStream2 {
    let id = extract(metas, "id");
    let function_id = match service {
        Some(service) => format!("{}.{}", service, id),
        None => id,
    };
    let description = match extract_optional(metas, "description") {
        Some(description) => quote!(::std::option::Option::Some(#description.into())),
        None => quote!(::std::option::Option::None),
    };
    let method_ident = method.sig.ident.clone();
    let handler_ident = format_ident!("{}_handler", method_ident);

    let input_type = method
        .sig
        .inputs
        .iter()
        .find_map(|arg| match arg {
            syn::FnArg::Typed(pat_type) => Some(pat_type.ty.clone()),
            syn::FnArg::Receiver(_) => None,
        });

    let invoke = match input_type {
        Some(ty) => quote! {
            let parsed: ::std::result::Result<#ty, ::serde_json::Error> =
                ::serde_json::from_value(input);
            let input = match parsed {
                ::std::result::Result::Ok(v) => v,
                ::std::result::Result::Err(err) => {
                    ::tracing::warn!(function_id = #function_id, error = %err, "Failed to deserialize input");
                    return crate::function::FunctionResult::Failure(crate::protocol::ErrorBody {
                        code: "deserialization_error".into(),
                        message: ::std::format!("Failed to deserialize input for {}: {}", #function_id, err),
                    });
                }
            };

            this.#method_ident(input).await
        },
        None => quote! {
            let _ = input;
            this.#method_ident().await
        },
    };

    quote! {
        {
            let this = self.clone();
            let #handler_ident = crate::engine::Handler::new(move |input: ::serde_json::Value| {
                let this = this.clone();

                async move {
                    #invoke
                }
            });

            crate::engine::EngineTrait::register_function_handler(
                &*engine,
                crate::engine::RegisterFunctionRequest {
                    function_id: #function_id.into(),
                    description: #description,
                    request_format: ::std::option::Option::None,
                    response_format: ::std::option::Option::None,
                },
                #handler_ident,
            );
        }
    }
}

/// Generates `register_functions` for every `#[function(id = "...")]` method of the impl.
///
/// With `#[service(name = "svc")]` the functions are registered as `svc.<id>`.
#[proc_macro_attribute]
pub fn service(attr: TokenStream, item: TokenStream) -> TokenStream {
    let mut imp = parse_macro_input!(item as syn::ItemImpl);

    let attr_ts: TokenStream2 = attr.into();
    let args: AttrArgs = Punctuated::<Meta, Token![,]>::parse_terminated
        .parse2(attr_ts)
        .expect("failed to parse attributes");
    let service_name = extract_optional(&args, "name");

    let mut generated = vec![];

    for item in imp.items.iter() {
        let method = match item {
            syn::ImplItem::Fn(m) => m,
            _ => continue,
        };

        for attr in method.attrs.iter().filter(|a| a.path().is_ident("function")) {
            match attr.parse_args_with(Punctuated::<Meta, Token![,]>::parse_terminated) {
                Ok(metas) => generated.push(handler_for(service_name.as_deref(), method, &metas)),
                Err(e) => panic!("failed to parse attributes: {}", e),
            }
        }
    }

    let register_fn = quote! {
        fn register_functions(&self, engine: ::std::sync::Arc<crate::engine::Engine>) {
            #(#generated)*
        }
    };

    imp.items.push(syn::ImplItem::Verbatim(register_fn));

    quote!(#imp).into()
}
