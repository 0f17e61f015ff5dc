//! Engine modules: the "brain" that turns devices and preferences into a
//! disk layout plan.
//!
//! Every module here is pure logic with no I/O. The plan is handed to a
//! [`executor::DeviceHandler`] to execute.
//!
//! | Module     | Role |
//! |------------|------|
//! | `size`     | Exact byte/sector arithmetic and size strings |
//! | `model`    | Planned partitions, devices and layouts |
//! | `prompt`   | Decisions the suggesters ask for |
//! | `swap`     | Fresh swap placement and retrofit |
//! | `layout`   | Single- and multi-disk suggesters |
//! | `mount`    | Mount order of a materialized layout |
//! | `executor` | Execution seam and dry-run handler |

pub mod executor;
pub mod layout;
pub mod model;
pub mod mount;
pub mod prompt;
pub mod size;
pub mod swap;
