//! DTO <-> entity mapping.
//!
//! Each DTO declares how it maps onto its entity by implementing
//! [`EntityMapper`], normally through [`impl_entity_mapping!`](crate::impl_entity_mapping).
//! Fields that are not listed are left alone in both directions.

/// A failed structural copy between two record shapes.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("cannot map {from} into {to}: {message}")]
pub struct MappingError {
    pub from: &'static str,
    pub to: &'static str,
    pub message: String,
}

impl MappingError {
    /// Describe a failure mapping `S` into `T`.
    pub fn new<S: ?Sized, T: ?Sized>(message: impl Into<String>) -> Self {
        Self {
            from: std::any::type_name::<S>(),
            to: std::any::type_name::<T>(),
            message: message.into(),
        }
    }
}

/// Bidirectional mapping between a DTO (`Self`) and its entity `E`.
pub trait EntityMapper<E>: Sized {
    /// Build the DTO from a stored entity.
    fn from_entity(entity: &E) -> Result<Self, MappingError>;

    /// Copy the DTO's fields onto `entity`. Unset optional fields leave the
    /// entity's value untouched.
    fn merge_into(&self, entity: &mut E) -> Result<(), MappingError>;
}

/// Map every entity to its DTO, stopping at the first failure.
pub fn map_entities<D, E>(entities: &[E]) -> Result<Vec<D>, MappingError>
where
    D: EntityMapper<E>,
{
    let mut dtos = Vec::with_capacity(entities.len());
    for entity in entities {
        dtos.push(D::from_entity(entity)?);
    }
    Ok(dtos)
}

/// Build a fresh entity from a DTO.
pub fn entity_from_dto<D, E>(dto: &D) -> Result<E, MappingError>
where
    D: EntityMapper<E>,
    E: Default,
{
    let mut entity = E::default();
    dto.merge_into(&mut entity)?;
    Ok(entity)
}

/// Generate an [`EntityMapper`] implementation from a field list.
///
/// - `copy` fields have the same type on both sides and are always copied.
/// - `merge` fields are `Option<T>` on the DTO and `T` on the entity. Reading
///   fills them with `Some`; writing only overwrites the entity when the DTO
///   value is `Some`.
///
/// The DTO must implement `Default`; fields not listed keep their default.
///
/// # Example
///
/// ```ignore
/// impl_entity_mapping!(UserDto => User {
///     copy: [name, email],
///     merge: [id, nickname, created_at],
/// });
/// ```
#[macro_export]
macro_rules! impl_entity_mapping {
    (
        $dto:ty => $entity:ty {
            copy: [$($copy:ident),* $(,)?],
            merge: [$($merge:ident),* $(,)?] $(,)?
        }
    ) => {
        impl $crate::mapper::EntityMapper<$entity> for $dto {
            #[allow(clippy::needless_update)]
            fn from_entity(
                entity: &$entity,
            ) -> ::std::result::Result<Self, $crate::mapper::MappingError> {
                ::std::result::Result::Ok(Self {
                    $($copy: ::std::clone::Clone::clone(&entity.$copy),)*
                    $($merge: ::std::option::Option::Some(::std::clone::Clone::clone(&entity.$merge)),)*
                    ..::std::default::Default::default()
                })
            }

            fn merge_into(
                &self,
                entity: &mut $entity,
            ) -> ::std::result::Result<(), $crate::mapper::MappingError> {
                $(entity.$copy = ::std::clone::Clone::clone(&self.$copy);)*
                $(
                    if let ::std::option::Option::Some(value) = &self.$merge {
                        entity.$merge = ::std::clone::Clone::clone(value);
                    }
                )*
                ::std::result::Result::Ok(())
            }
        }
    };
}
