/// Constants shared across the buildbridge workspace

// Build-tool command verbs the interpreter reacts to
pub const BUILD_COMMAND: &str = "build";
pub const TEST_COMMAND: &str = "test";

// Output group conventionally carrying the primary artifacts of a target.
// Successful completion of this group is what retracts stale diagnostics.
pub const DEFAULT_OUTPUT_GROUP: &str = "default";

// Suffix of the structured test report artifact among a test action's outputs
pub const TEST_REPORT_SUFFIX: &str = "test.xml";

// Display name used when a test run produced no structured report
pub const GENERIC_TEST_CASE_NAME: &str = "test";

// Flag telling the external tool where to publish its event stream
pub const EVENT_FILE_FLAG: &str = "--build_event_json_file";
pub const EVENT_SOCKET_FLAG: &str = "--build_event_json_socket";

// Prefix for temp files holding one invocation's event stream
pub const EVENT_FILE_PREFIX: &str = "buildbridge-events";

// Progress lines with this prefix are continuations and are not re-logged
pub const CONTINUATION_MESSAGE_PREFIX: &str = "    ";
