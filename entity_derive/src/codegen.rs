//! Code generation for the `Entity` implementation

use proc_macro2::TokenStream;
use quote::quote;
use syn::DeriveInput;

use crate::parsing::{EntityInfo, FieldInfo, FieldRole};

pub fn generate_entity_impl(input: &DeriveInput, entity_info: &EntityInfo, fields: &[FieldInfo]) -> TokenStream {
    let name = &input.ident;
    let entity_name = name.to_string();
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let table_fn = entity_info.table.as_ref().map(|table| {
        quote! {
            fn table_name() -> ::core::option::Option<&'static str> {
                ::core::option::Option::Some(#table)
            }
        }
    });

    let document_fn = match (&entity_info.index, &entity_info.doc_type) {
        (Some(index), Some(doc_type)) => Some(quote! {
            fn document() -> ::core::option::Option<::querydeck::query_engine::entity::DocumentTarget> {
                ::core::option::Option::Some(::querydeck::query_engine::entity::DocumentTarget {
                    index: #index,
                    doc_type: #doc_type,
                })
            }
        }),
        _ => None,
    };

    let field_metas = fields.iter().map(|field| {
        let field_name = field.ident.to_string();
        let backend_name = &field.backend_name;
        let rust_type = &field.rust_type;
        let kind = match field.role {
            FieldRole::Normal => quote!(Normal),
            FieldRole::PrimaryKey => quote!(PrimaryKey),
            FieldRole::Version => quote!(Version),
        };
        quote! {
            ::querydeck::query_engine::entity::FieldMeta::new(
                #field_name,
                #backend_name,
                ::querydeck::query_engine::entity::FieldKind::#kind,
                #rust_type,
            )
        }
    });

    quote! {
        impl #impl_generics ::querydeck::query_engine::entity::Entity for #name #ty_generics #where_clause {
            fn entity_name() -> &'static str {
                #entity_name
            }

            #table_fn

            #document_fn

            fn fields() -> &'static [::querydeck::query_engine::entity::FieldMeta] {
                const FIELDS: &[::querydeck::query_engine::entity::FieldMeta] = &[#(#field_metas),*];
                FIELDS
            }
        }
    }
}
