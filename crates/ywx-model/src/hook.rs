//! Change-notification plumbing shared by all entities.

use std::rc::Rc;

/// Zero-argument observer invoked after every effective mutation.
///
/// Stored as a plain closure reference rather than a trait method so the
/// host application can drive dirty-flag tracking without the model
/// depending on any UI layer. Hooks are synchronous and reentrant-unsafe:
/// a hook must not mutate the entity it observes.
pub type ChangeHook = Rc<dyn Fn()>;

/// Generates a getter/setter pair where the setter stores the new value and
/// fires the change hook only when the value actually changed.
macro_rules! hooked_field {
    (opt $field:ident: $ty:ty, $get:ident, $set:ident) => {
        pub fn $get(&self) -> Option<&$ty> {
            self.$field.as_ref()
        }

        pub fn $set(&mut self, value: Option<$ty>) {
            if self.$field != value {
                self.$field = value;
                self.notify();
            }
        }
    };
    (plain $field:ident: $ty:ty, $get:ident, $set:ident) => {
        pub fn $get(&self) -> $ty {
            self.$field
        }

        pub fn $set(&mut self, value: $ty) {
            if self.$field != value {
                self.$field = value;
                self.notify();
            }
        }
    };
    (list $field:ident: $ty:ty, $get:ident, $set:ident) => {
        pub fn $get(&self) -> &$ty {
            &self.$field
        }

        pub fn $set(&mut self, value: $ty) {
            if self.$field != value {
                self.$field = value;
                self.notify();
            }
        }
    };
}

/// Implements hook storage and `notify` for an entity struct with an
/// `on_change` field.
macro_rules! hooked_entity {
    ($name:ident) => {
        impl $name {
            pub fn set_change_hook(&mut self, hook: crate::ChangeHook) {
                self.on_change = Some(hook);
            }

            pub fn clear_change_hook(&mut self) {
                self.on_change = None;
            }

            fn notify(&self) {
                if let Some(hook) = &self.on_change {
                    hook();
                }
            }
        }
    };
}

pub(crate) use hooked_entity;
pub(crate) use hooked_field;
