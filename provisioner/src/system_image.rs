//! Boot image descriptor and factory secrets rendering.
//!
//! After the PetaLinux build succeeds, `bootgen` needs a `.bif` descriptor
//! naming the first-stage bootloader, the participant bitstream, u-boot, and
//! the kernel image with its load address. The factory secrets file is a hook
//! for designs that provision per-device secrets; the reference design has
//! none, so it is written empty.

use camino::{Utf8Path, Utf8PathBuf};

/// File name of the boot image descriptor.
pub const SYSTEM_IMAGE_FILE: &str = "SystemImage.bif";

/// File name of the factory secrets placeholder.
pub const FACTORY_SECRETS_FILE: &str = "FactorySecrets.txt";

/// First-stage bootloader shipped with the provisioning tools.
pub const BOOTLOADER_PATH: &str = "/home/vagrant/MES/tools/files/zynq_fsbl.elf";

/// PetaLinux project directory beneath the build output root.
pub const PROJECT_DIR: &str = "Arty-Z7-10";

/// Address the kernel FIT image is loaded at.
pub const KERNEL_LOAD_ADDRESS: u32 = 0x1000_0000;

/// Directory holding the built Linux images for a build output root.
#[must_use]
pub fn images_dir(build_output_root: &Utf8Path) -> Utf8PathBuf {
    build_output_root.join(PROJECT_DIR).join("images").join("linux")
}

/// Render `SystemImage.bif` for images built under `build_output_root`.
///
/// # Examples
///
/// ```
/// use camino::Utf8Path;
/// use mes_provisioner::system_image::render_system_image;
///
/// let bif = render_system_image(Utf8Path::new("/opt/petalinux"));
/// assert!(bif.contains("[load=0x10000000] /opt/petalinux/Arty-Z7-10/images/linux/image.ub"));
/// ```
#[must_use]
pub fn render_system_image(build_output_root: &Utf8Path) -> String {
    let images = images_dir(build_output_root);
    format!(
        "
MITRE_Entertainment_System: {{
    [bootloader] {BOOTLOADER_PATH}
    // Participants Bitstream
    {bitstream}
    // Paritcipants Images
    {uboot}
    [load={KERNEL_LOAD_ADDRESS:#010x}] {kernel}
}}
    ",
        bitstream = images.join("Arty_Z7_10_wrapper.bit"),
        uboot = images.join("u-boot.elf"),
        kernel = images.join("image.ub"),
    )
}

/// Render the factory secrets file, which is intentionally empty.
#[must_use]
pub fn render_factory_secrets() -> String {
    String::new()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_image_matches_expected_layout() {
        let expected = "
MITRE_Entertainment_System: {
    [bootloader] /home/vagrant/MES/tools/files/zynq_fsbl.elf
    // Participants Bitstream
    /opt/pl/Arty-Z7-10/images/linux/Arty_Z7_10_wrapper.bit
    // Paritcipants Images
    /opt/pl/Arty-Z7-10/images/linux/u-boot.elf
    [load=0x10000000] /opt/pl/Arty-Z7-10/images/linux/image.ub
}
    ";
        assert_eq!(render_system_image(Utf8Path::new("/opt/pl")), expected);
    }

    #[test]
    fn trailing_separator_on_root_is_not_doubled() {
        let bif = render_system_image(Utf8Path::new("/opt/pl/"));
        assert!(!bif.contains("//Arty-Z7-10"));
    }

    #[test]
    fn images_dir_is_under_project() {
        assert_eq!(
            images_dir(Utf8Path::new("/srv/build")),
            Utf8PathBuf::from("/srv/build/Arty-Z7-10/images/linux")
        );
    }

    #[test]
    fn factory_secrets_are_empty() {
        assert!(render_factory_secrets().is_empty());
    }
}
