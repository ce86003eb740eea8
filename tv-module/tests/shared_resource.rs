use tv_core::{ColorSpace, ImageHeader};
use tv_module::{Module, ModuleWrapper, SharedResource};

struct NoopModule;

impl Module for NoopModule {
    fn execute(&mut self, _input_header: &ImageHeader, _input_data: &[u8], _output: Option<(&ImageHeader, &mut [u8])>) {}
}

fn wrapper(id: i16) -> ModuleWrapper {
    let mut wrapper = ModuleWrapper::new(id, "noop", Box::new(NoopModule));
    wrapper.initialize();
    wrapper
}

#[test]
fn insert_then_exec_all_visits_every_wrapper_in_order() {
    let resources: SharedResource<ModuleWrapper> = SharedResource::new();
    resources.insert(3, wrapper(3));
    resources.insert(1, wrapper(1));
    resources.insert(2, wrapper(2));

    let mut seen = Vec::new();
    resources.exec_all(|id, w| {
        w.enable();
        seen.push(id);
    });
    assert_eq!(seen, vec![3, 1, 2]);
    assert_eq!(resources.count_matching(|w| w.enabled()), 3);
}

#[test]
fn removing_a_tagged_wrapper_leaves_the_rest_untouched() {
    let resources: SharedResource<ModuleWrapper> = SharedResource::new();
    resources.insert(1, wrapper(1));
    resources.insert(2, wrapper(2));

    resources.exec_one(2, |w| w.tag(tv_module::ModuleTag::REMOVABLE));
    let removed = resources.remove_if(|w| w.is_removable());

    assert_eq!(removed.into_iter().map(|(id, _)| id).collect::<Vec<_>>(), vec![2]);
    assert!(resources.managed(1));
    assert!(!resources.managed(2));
}

#[test]
fn unmanaged_id_reports_none_everywhere() {
    let resources: SharedResource<ModuleWrapper> = SharedResource::new();
    assert_eq!(resources.exec_one(42, |w| w.enable()), None);
    assert!(!resources.managed(42));
}
