// VirtualMachine command implementations
//
// These are the fundamental commands for interacting with the JVM

use crate::commands::{
    AllClassesWithGenericCommand, ClassesBySignatureCommand, IdSizesCommand, ResumeCommand,
    SuspendCommand, VersionCommand,
};
use crate::connection::JdwpConnection;
use crate::protocol::JdwpResult;
use crate::types::{ClassData, ClassInfo, IdSizes, VmVersion};

impl JdwpConnection {
    /// Get JVM version information (VirtualMachine.Version command)
    pub async fn get_version(&self) -> JdwpResult<VmVersion> {
        self.send_command(VersionCommand::default()).await
    }

    /// Get ID sizes (VirtualMachine.IDSizes command)
    /// This tells us how many bytes are used for various ID types.
    /// Does not apply them; see [`JdwpConnection::initialize`].
    pub async fn get_id_sizes(&self) -> JdwpResult<IdSizes> {
        self.send_command(IdSizesCommand::default()).await
    }

    /// List loaded classes (VirtualMachine.AllClassesWithGeneric command)
    pub async fn all_classes_with_generic(&self) -> JdwpResult<Vec<ClassData>> {
        self.send_command(AllClassesWithGenericCommand::default())
            .await
    }

    /// Find classes by signature (VirtualMachine.ClassesBySignature command)
    /// Signature format: "Lcom/example/MyClass;" for classes
    pub async fn classes_by_signature(&self, signature: &str) -> JdwpResult<Vec<ClassInfo>> {
        self.send_command(ClassesBySignatureCommand::new(signature))
            .await
    }

    /// Suspend all threads (VirtualMachine.Suspend command)
    pub async fn suspend(&self) -> JdwpResult<()> {
        self.send_command(SuspendCommand).await
    }

    /// Resume all threads (VirtualMachine.Resume command)
    pub async fn resume(&self) -> JdwpResult<()> {
        self.send_command(ResumeCommand).await
    }
}
