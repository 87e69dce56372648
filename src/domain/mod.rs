// Domain layer: models and ports shared by the class space resolver and the deployment core.

pub mod model;
pub mod ports;

pub use model::{
    AnnotationInfo, ClassInfo, CodeLocation, FilterDef, HookBinding, ModuleId, ModuleRef,
    OrderingEntry, Registration, RelativeOrdering, ServletDef, TypeHandle, WebDescriptor,
    WebEvent, WebEventPhase,
};
pub use ports::{ClassInspector, DescriptorEngine, ModuleSystem, Scheduler, Task, WebRuntime};
