// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Class resolution for restoring controllers and change handlers from saved state.

use core::any::{Any, TypeId};
use core::fmt;
use std::collections::HashMap;
use std::rc::Rc;

use crate::bundle::Bundle;
use crate::change::{AnimatorChangeHandler, ChangeHandler, NoOpChangeHandler, SimpleSwapChangeHandler};
use crate::controller::Controller;
use crate::error::NavError;

type ControllerConstructor = Rc<dyn Fn(Option<&Bundle>) -> Result<Box<dyn Controller>, String>>;
type HandlerConstructor = fn() -> Box<dyn ChangeHandler>;

/// Constructors keyed by class name.
///
/// Saved state stores class names; restoring looks them up here. A name given at
/// registration ([`ClassRegistry::register_controller_named`],
/// [`ClassRegistry::register_change_handler_named`]) is what gets saved for that type.
/// Without one, types register under [`core::any::type_name`], which may change between
/// compiler versions; bags meant to outlive a toolchain upgrade should use explicit names.
///
/// The built-in change handlers are registered by [`ClassRegistry::new`].
#[derive(Clone)]
pub struct ClassRegistry {
    controllers: HashMap<String, ControllerConstructor>,
    change_handlers: HashMap<String, HandlerConstructor>,
    controller_names: HashMap<TypeId, String>,
    handler_names: HashMap<TypeId, String>,
}

impl fmt::Debug for ClassRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut controllers: Vec<_> = self.controllers.keys().collect();
        controllers.sort();
        let mut handlers: Vec<_> = self.change_handlers.keys().collect();
        handlers.sort();
        f.debug_struct("ClassRegistry")
            .field("controllers", &controllers)
            .field("change_handlers", &handlers)
            .finish_non_exhaustive()
    }
}

impl Default for ClassRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ClassRegistry {
    /// A registry holding the built-in change handlers.
    pub fn new() -> Self {
        let mut registry = Self {
            controllers: HashMap::new(),
            change_handlers: HashMap::new(),
            controller_names: HashMap::new(),
            handler_names: HashMap::new(),
        };
        registry
            .register_change_handler::<SimpleSwapChangeHandler>()
            .register_change_handler::<NoOpChangeHandler>()
            .register_change_handler::<AnimatorChangeHandler>();
        registry
    }

    /// Register a controller restored through its zero-argument constructor.
    pub fn register_controller<C: Controller + Default>(&mut self) -> &mut Self {
        self.register_controller_named(core::any::type_name::<C>(), |_| Ok(C::default()))
    }

    /// Register a controller restored from its argument bag.
    pub fn register_controller_with_args<C: Controller>(
        &mut self,
        constructor: impl Fn(Option<&Bundle>) -> Result<C, String> + 'static,
    ) -> &mut Self {
        self.register_controller_named(core::any::type_name::<C>(), constructor)
    }

    /// Register a controller under an explicit class name, saved in place of its type name.
    pub fn register_controller_named<C: Controller>(
        &mut self,
        class: &str,
        constructor: impl Fn(Option<&Bundle>) -> Result<C, String> + 'static,
    ) -> &mut Self {
        let constructor: ControllerConstructor = Rc::new(move |args| {
            constructor(args).map(|c| Box::new(c) as Box<dyn Controller>)
        });
        self.controllers.insert(class.to_owned(), constructor);
        self.controller_names.insert(TypeId::of::<C>(), class.to_owned());
        self
    }

    /// Register a change handler restored through its zero-argument constructor.
    pub fn register_change_handler<H: ChangeHandler + Default>(&mut self) -> &mut Self {
        self.register_change_handler_named::<H>(core::any::type_name::<H>())
    }

    /// Register a change handler under an explicit class name, saved in place of its type
    /// name.
    pub fn register_change_handler_named<H: ChangeHandler + Default>(&mut self, class: &str) -> &mut Self {
        let constructor: HandlerConstructor = || Box::new(H::default()) as Box<dyn ChangeHandler>;
        self.change_handlers.insert(class.to_owned(), constructor);
        self.handler_names.insert(TypeId::of::<H>(), class.to_owned());
        self
    }

    /// Name saved for `controller`: its registered name, else [`Controller::class_name`].
    pub(crate) fn controller_class<'a>(&'a self, controller: &'a dyn Controller) -> &'a str {
        let type_id = (controller as &dyn Any).type_id();
        self.controller_names
            .get(&type_id)
            .map_or_else(|| controller.class_name(), String::as_str)
    }

    /// Name saved for `handler`: its registered name, else [`ChangeHandler::type_name`].
    pub(crate) fn change_handler_class<'a>(&'a self, handler: &'a dyn ChangeHandler) -> &'a str {
        let type_id = (handler as &dyn Any).type_id();
        self.handler_names
            .get(&type_id)
            .map_or_else(|| handler.type_name(), String::as_str)
    }

    /// Whether a controller class can be restored.
    pub fn has_controller(&self, class: &str) -> bool {
        self.controllers.contains_key(class)
    }

    pub(crate) fn new_controller(
        &self,
        class: &str,
        args: Option<&Bundle>,
    ) -> Result<Box<dyn Controller>, NavError> {
        let constructor = self
            .controllers
            .get(class)
            .ok_or_else(|| NavError::MissingConstructor {
                class: class.to_owned(),
            })?;
        constructor(args).map_err(|reason| NavError::ReflectiveFailure {
            class: class.to_owned(),
            reason,
        })
    }

    pub(crate) fn new_change_handler(&self, class: &str) -> Result<Box<dyn ChangeHandler>, NavError> {
        let constructor =
            self.change_handlers
                .get(class)
                .ok_or_else(|| NavError::MissingConstructor {
                    class: class.to_owned(),
                })?;
        Ok(constructor())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::ControllerContext;
    use understory_view::{LocalView, ViewId};

    #[derive(Default)]
    struct Plain;

    impl Controller for Plain {
        fn on_create_view(&mut self, cx: &mut ControllerContext<'_>, _container: ViewId) -> ViewId {
            cx.views_mut().insert(None, LocalView::default())
        }
    }

    struct NeedsTitle(String);

    impl Controller for NeedsTitle {
        fn on_create_view(&mut self, cx: &mut ControllerContext<'_>, _container: ViewId) -> ViewId {
            let view = cx.views_mut().insert(None, LocalView::default());
            cx.views_mut().set_state(view, self.0.clone().into());
            view
        }
    }

    #[test]
    fn resolves_registered_classes() {
        let mut registry = ClassRegistry::new();
        registry.register_controller::<Plain>();
        let class = core::any::type_name::<Plain>();
        assert!(registry.has_controller(class));
        assert!(registry.new_controller(class, None).is_ok());
        assert!(registry
            .new_change_handler(core::any::type_name::<NoOpChangeHandler>())
            .is_ok());
    }

    #[test]
    fn explicit_names_replace_type_names() {
        let mut registry = ClassRegistry::new();
        registry
            .register_controller_named("app.Plain", |_| Ok(Plain))
            .register_change_handler_named::<SimpleSwapChangeHandler>("app.SimpleSwap");
        assert_eq!(registry.controller_class(&Plain), "app.Plain");
        assert!(registry.new_controller("app.Plain", None).is_ok());
        assert_eq!(
            registry.change_handler_class(&SimpleSwapChangeHandler::default()),
            "app.SimpleSwap"
        );
        assert!(registry.new_change_handler("app.SimpleSwap").is_ok());

        let unregistered = NeedsTitle("x".into());
        assert_eq!(
            registry.controller_class(&unregistered),
            core::any::type_name::<NeedsTitle>(),
            "unregistered types fall back to their type name"
        );
    }

    #[test]
    fn unknown_class_is_missing_constructor() {
        let registry = ClassRegistry::new();
        assert!(matches!(
            registry.new_controller("nowhere::Controller", None),
            Err(NavError::MissingConstructor { .. })
        ));
    }

    #[test]
    fn failing_constructor_is_reflective_failure() {
        let mut registry = ClassRegistry::new();
        registry.register_controller_with_args(|args: Option<&Bundle>| {
            args.and_then(|a| a.get_string("title"))
                .map(|t| NeedsTitle(t.to_owned()))
                .ok_or_else(|| "missing title".to_owned())
        });
        let class = core::any::type_name::<NeedsTitle>();
        let err = registry.new_controller(class, None).err().unwrap();
        assert!(matches!(err, NavError::ReflectiveFailure { .. }));

        let mut args = Bundle::new();
        args.put_string("title", "Inbox");
        assert!(registry.new_controller(class, Some(&args)).is_ok());
    }
}
