// build.rs

fn main() {
    // Link against X11, its extensions, GL (for GLX entry points) and
    // pangoft2 (text-layout context provider). pkg-config is the standard way
    // to find linking information; fall back to manual flags when it is not
    // available or a .pc file is missing.

    let libraries = ["x11", "xrender", "xrandr", "gl", "pangoft2"];

    let mut pkg_config_success = true;

    for lib in &libraries {
        if pkg_config::probe_library(lib).is_err() {
            eprintln!(
                "pkg-config failed for library '{}'. Falling back to manual linking.",
                lib
            );
            pkg_config_success = false;
            break;
        }
    }

    if !pkg_config_success {
        // Manual fallback. Assumes the development libraries live in the
        // standard search paths.
        println!("cargo:rustc-link-lib=X11");
        println!("cargo:rustc-link-lib=Xext");
        println!("cargo:rustc-link-lib=Xrender");
        println!("cargo:rustc-link-lib=Xrandr");
        println!("cargo:rustc-link-lib=GL");
        println!("cargo:rustc-link-lib=pangoft2-1.0");
        println!("cargo:rustc-link-lib=pango-1.0");
        println!("cargo:rustc-link-lib=gobject-2.0");
        println!("cargo:rustc-link-lib=glib-2.0");
        println!("cargo:rustc-link-search=/usr/lib");

        eprintln!(
            "Manual linking flags applied. Ensure X11, Xrender, Xrandr, GL and Pango development libraries are installed."
        );
    }

    // libva / libvdpau are deliberately absent here: the hardware-decode
    // backends are opened with dlopen at runtime so their absence degrades
    // gracefully instead of failing the link.
}
