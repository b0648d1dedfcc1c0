//! Configuration generator: turns an [`AppFile`] into the Components and
//! the ApplicationConfiguration that binds them.

use vela_core::oam::label;
use vela_core::{
    ApplicationConfiguration, Component, ComponentReference, ComponentScope, ComponentTrait,
    ObjectMeta,
};

use crate::appfile::AppFile;
use crate::error::ControllerError;

/// Builds one Component per application component plus the configuration.
///
/// Trait lists mirror the parser's order one-to-one. References are plain
/// component names; pinning to revisions happens after apply.
pub fn generate_application_configuration(
    app_file: &AppFile,
) -> Result<(ApplicationConfiguration, Vec<Component>), ControllerError> {
    let mut configuration = ApplicationConfiguration::new(owned_meta(app_file, &app_file.name));
    let mut components = Vec::with_capacity(app_file.components.len());

    for file in &app_file.components {
        let meta = owned_meta(app_file, &file.name)
            .with_label(label::WORKLOAD_TYPE, file.workload_type.clone());
        components.push(Component::new(meta, file.workload.clone()));

        let mut reference = ComponentReference::named(&file.name);
        reference.traits = file
            .traits
            .iter()
            .flat_map(|t| t.objects.iter())
            .map(|o| ComponentTrait {
                object: o.object.clone(),
            })
            .collect();
        reference.scopes = file
            .scopes
            .iter()
            .map(|scope| ComponentScope {
                scope_ref: scope.clone(),
            })
            .collect();
        configuration.spec.components.push(reference);
    }

    Ok((configuration, components))
}

/// Metadata for an object derived from the Application.
pub(crate) fn owned_meta(app_file: &AppFile, name: &str) -> ObjectMeta {
    let mut meta = ObjectMeta::new(name, app_file.namespace.clone())
        .with_label(label::APP_NAME, app_file.name.clone());
    if let Some(owner) = &app_file.owner {
        meta = meta.with_owner(owner.clone());
    }
    meta
}
